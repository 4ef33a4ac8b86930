//! # cebus CLI
//!
//! Command-line utilities for inspecting topics, keys and subscriptions.

use anyhow::{bail, Context, Result};
use cebus_core::{
    EventContext, EventType, Identity, EXTENSION_CLUSTER_NAME, EXTENSION_ORIGINAL_SOURCE,
};
use cebus_proto::{
    AddressResolver, AgentAddressResolver, MessageKey, SourceAddressResolver, TopicScheme,
};
use std::env;

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_help();
        return Ok(());
    }

    let operands = &args[2..];
    let output = match args[1].as_str() {
        "route" => route_agent(operands)?,
        "route-source" => route_source(operands)?,
        "subscriptions" => subscriptions(operands)?,
        "parse-type" => parse_type(operands)?,
        "parse-topic" => parse_topic(operands)?,
        "key" => key(operands)?,
        "help" | "--help" | "-h" => {
            print_help();
            return Ok(());
        }
        cmd => {
            eprintln!("Unknown command: {cmd}");
            print_help();
            std::process::exit(1);
        }
    };

    println!("{output}");
    Ok(())
}

fn expect_operands<'a, const N: usize>(
    operands: &'a [String],
    usage: &str,
) -> Result<[&'a str; N]> {
    if operands.len() != N {
        bail!("Usage: cebus {usage}");
    }
    let mut out = [""; N];
    for (slot, operand) in out.iter_mut().zip(operands) {
        *slot = operand.as_str();
    }
    Ok(out)
}

/// Collect `--name value` pairs; every name is required exactly once.
fn expect_flags<'a, const N: usize>(
    operands: &'a [String],
    names: [&str; N],
    usage: &str,
) -> Result<[&'a str; N]> {
    let mut out: [Option<&str>; N] = [None; N];

    let mut rest = operands.iter();
    while let Some(flag) = rest.next() {
        let Some(index) = flag
            .strip_prefix("--")
            .and_then(|name| names.iter().position(|n| *n == name))
        else {
            bail!("Unexpected argument '{flag}'\nUsage: cebus {usage}");
        };
        let Some(value) = rest.next() else {
            bail!("Missing value for {flag}\nUsage: cebus {usage}");
        };
        if out[index].replace(value.as_str()).is_some() {
            bail!("{flag} given twice\nUsage: cebus {usage}");
        }
    }

    let mut values = [""; N];
    for ((slot, value), name) in values.iter_mut().zip(out).zip(names) {
        let Some(value) = value else {
            bail!("Missing --{name}\nUsage: cebus {usage}");
        };
        *slot = value;
    }
    Ok(values)
}

fn route_agent(operands: &[String]) -> Result<String> {
    let [cluster, original_source, event_type] = expect_flags(
        operands,
        ["cluster", "source", "type"],
        "route --cluster <cluster> --source <original-source> --type <event-type>",
    )?;

    let resolver = AgentAddressResolver::new(Identity::new(cluster).context("Invalid cluster")?);
    let event_type = EventType::parse(event_type).context("Invalid event type")?;
    let context = EventContext::new(cluster, &event_type)
        .with_extension(EXTENSION_ORIGINAL_SOURCE, original_source);

    let routing = resolver.resolve(&context)?;
    Ok(format!("topic: {}\nkey:   {}", routing.topic, routing.message_key))
}

fn route_source(operands: &[String]) -> Result<String> {
    let [source, cluster, event_type] = expect_flags(
        operands,
        ["source", "cluster", "type"],
        "route-source --source <source> --cluster <cluster> --type <event-type>",
    )?;

    let resolver = SourceAddressResolver::new(Identity::new(source).context("Invalid source")?);
    let event_type = EventType::parse(event_type).context("Invalid event type")?;
    let context =
        EventContext::new(source, &event_type).with_extension(EXTENSION_CLUSTER_NAME, cluster);

    let routing = resolver.resolve(&context)?;
    Ok(format!("topic: {}\nkey:   {}", routing.topic, routing.message_key))
}

fn subscriptions(operands: &[String]) -> Result<String> {
    let subscriptions = match operands {
        [flag, cluster] if flag == "--cluster" => {
            AgentAddressResolver::new(Identity::new(cluster.as_str())?).subscriptions()
        }
        [flag, source] if flag == "--source" => {
            SourceAddressResolver::new(Identity::new(source.as_str())?).subscriptions()
        }
        _ => bail!("Usage: cebus subscriptions --cluster <cluster> | --source <source>"),
    };
    let patterns: Vec<String> = subscriptions.iter().map(ToString::to_string).collect();
    Ok(patterns.join("\n"))
}

fn parse_type(operands: &[String]) -> Result<String> {
    let [raw] = expect_operands(operands, "parse-type <event-type>")?;
    let event_type = EventType::parse(raw)?;

    Ok(format!(
        "group:       {}\nversion:     {}\nresource:    {}\nsubresource: {}\naction:      {}",
        event_type.data_type.group,
        event_type.data_type.version,
        event_type.data_type.resource,
        event_type.sub_resource.as_str(),
        event_type.action
    ))
}

fn parse_topic(operands: &[String]) -> Result<String> {
    let [topic] = expect_operands(operands, "parse-topic <topic>")?;
    let Some(parsed) = TopicScheme::default().parse(topic) else {
        bail!("Not a cebus topic: {topic}");
    };

    Ok(format!(
        "role:    {:?}\nsource:  {}\ncluster: {}",
        parsed.role,
        parsed.source.as_deref().unwrap_or("-"),
        parsed.cluster.as_deref().unwrap_or("-")
    ))
}

fn key(operands: &[String]) -> Result<String> {
    match operands {
        [cluster] => Ok(MessageKey::broadcast(cluster).to_string()),
        [origin, target] => Ok(MessageKey::point_to_point(origin, target).to_string()),
        _ => bail!("Usage: cebus key <origin> <target> | <cluster>"),
    }
}

fn print_help() {
    println!(
        r#"cebus CLI

USAGE:
    cebus <COMMAND> [OPTIONS]

COMMANDS:
    route --cluster <cluster> --source <original-source> --type <event-type>
                                    Topic and key an agent publishes an event with
    route-source --source <source> --cluster <cluster> --type <event-type>
                                    Topic and key a source publishes an event with
    subscriptions --cluster <cluster>
                                    Patterns an agent subscribes to
    subscriptions --source <source> Patterns a source subscribes to
    parse-type <event-type>         Split an event type into its parts
    parse-topic <topic>             Show the role and identities of a topic
    key <origin> <target>           Point-to-point message key
    key <cluster>                   Broadcast message key
    help                            Show this help message

EXAMPLES:
    cebus route --cluster cluster7 --source hub --type io.cebus.works.v1.manifests.status.update-request
    cebus route --cluster cluster7 --source '*' --type io.cebus.works.v1.manifests.spec.resync-request
    cebus subscriptions --cluster cluster7
"#
    );
}
