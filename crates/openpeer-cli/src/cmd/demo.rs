//! Demo command: a parent and its children on one in-process hub.

use openpeer_channel::{listener, Channel, ChannelConfig, MemoryHub, Namespace};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;

const HANDSHAKE_WAIT: Duration = Duration::from_secs(2);
const CALL_WAIT: Duration = Duration::from_secs(5);

pub fn cmd_demo(config: Option<PathBuf>, id: Option<String>, peers: usize) {
    let mut config = openpeer_channel::load_config(config.as_deref());
    if let Some(id) = id {
        config.id = id;
    }

    let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
        eprintln!("Failed to start runtime: {e}");
        std::process::exit(1);
    });
    if let Err(e) = rt.block_on(run_demo(config, peers)) {
        eprintln!("Demo failed: {e}");
        std::process::exit(1);
    }
}

async fn run_demo(config: ChannelConfig, peers: usize) -> Result<(), String> {
    let hub = MemoryHub::new();
    let transport = hub.attach();
    let parent_endpoint = transport.id();
    let parent = Channel::open(config.clone(), transport, vec![]).map_err(|e| e.to_string())?;
    parent.register_all(
        Namespace::new()
            .with("greet", |_| Ok(json!("hi")))
            .with_typed("add", |(a, b): (i64, i64)| Ok(a + b)),
    );
    println!("parent  {} on {}", parent.peer_id(), parent.session_id());

    let mut children = Vec::with_capacity(peers);
    for n in 0..peers {
        let transport = hub.attach();
        let sink = transport.sink_to(parent_endpoint);
        let child = Channel::open(config.clone(), transport, vec![sink]).map_err(|e| e.to_string())?;
        child.message(
            "tick",
            listener(move |data| println!("child {n} got tick: {data}")),
        );
        println!("child {n} {}", child.peer_id());
        children.push(child);
    }

    let deadline = tokio::time::Instant::now() + HANDSHAKE_WAIT;
    while parent.peer_count() < peers || children.iter().any(|c| c.peer_count() == 0) {
        if tokio::time::Instant::now() >= deadline {
            return Err(format!(
                "handshake incomplete: parent knows {} of {peers} children",
                parent.peer_count()
            ));
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    println!("handshake complete: {} peers registered", parent.peer_count());

    let delivered = parent.push(json!({"n": 1}), "tick");
    println!("parent pushed tick to {delivered} peers");

    for (n, child) in children.iter().enumerate() {
        let greet = tokio::time::timeout(CALL_WAIT, child.call("greet", vec![])).await;
        let add = tokio::time::timeout(CALL_WAIT, child.call("add", vec![json!(n), json!(40)])).await;
        let missing = tokio::time::timeout(CALL_WAIT, child.call("shout", vec![])).await;
        println!("child {n} greet -> {}", render(greet));
        println!("child {n} add({n}, 40) -> {}", render(add));
        println!("child {n} shout -> {}", render(missing));
    }

    for child in &children {
        child.destroy();
    }
    parent.destroy();
    Ok(())
}

fn render(
    outcome: Result<Result<serde_json::Value, openpeer_channel::CallError>, tokio::time::error::Elapsed>,
) -> String {
    match outcome {
        Ok(Ok(value)) => value.to_string(),
        Ok(Err(e)) => format!("error: {e}"),
        Err(_) => "no reply".to_string(),
    }
}
