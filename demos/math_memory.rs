//! Typed call stubs over the in-memory transport.
//!
//! A toy peer answers `add`, `printNum` and `load_file`; the client side
//! wraps each procedure in a small typed function that forwards to
//! `RpcClient::call_as`.

use duplex_rpc::{
    // ---
    CallEnvelope,
    MemoryHub,
    MemoryPeer,
    Result,
    RpcClient,
    RpcClientBuilder,
    TransportBuilder,
};
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct Reply<T> {
    result: T,
}

async fn add(client: &RpcClient, num1: i64, num2: i64) -> Result<i64> {
    let reply: Reply<i64> = client.call_as("add", (num1, num2)).await?;
    Ok(reply.result)
}

async fn print_num(client: &RpcClient, num: i64) -> Result<()> {
    client.call("printNum", (num,)).await?;
    Ok(())
}

async fn load_file(client: &RpcClient, filename: &str) -> Result<Vec<String>> {
    let reply: Reply<Vec<String>> = client.call_as("load_file", (filename,)).await?;
    Ok(reply.result)
}

/// Answers calls until the client goes away.
async fn serve(mut peer: MemoryPeer) {
    // ---
    while let Some(text) = peer.recv().await {
        let Ok(env) = CallEnvelope::from_text(&text) else {
            continue;
        };

        let result = match env.function.as_str() {
            "add" => json!(env.args.iter().filter_map(Value::as_i64).sum::<i64>()),
            "printNum" => {
                println!("peer: printNum({})", env.args.first().unwrap_or(&Value::Null));
                Value::Null
            }
            "load_file" => json!(["add", "printNum", "load_file"]),
            other => json!({ "error": format!("unknown function {other}") }),
        };

        let reply = json!({ "id": env.id, "result": result });
        if peer.send(reply.to_string()).await.is_err() {
            break;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    env_logger::init();

    let mut listener = MemoryHub::global().listen("math")?;

    let transport = TransportBuilder::new()
        .uri("memory://math")
        .node_id("math-client")
        .build()
        .await?;

    let client = RpcClientBuilder::new(transport).build().await?;

    if let Some(peer) = listener.accept().await {
        tokio::spawn(serve(peer));
    }

    println!("20 + 3 = {}", add(&client, 20, 3).await?);
    print_num(&client, 42).await?;
    println!("functions in main.go: {:?}", load_file(&client, "main.go").await?);

    client.close().await?;
    Ok(())
}
