use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

use duplex_rpc::{
    //
    create_memory_transport_with_hub,
    CallEnvelope,
    MemoryHub,
    MemoryPeer,
    Result,
    RpcClient,
    RpcClientBuilder,
    RpcError,
    TransportConfig,
};

const WAIT: Duration = Duration::from_millis(500);
const STILL_PENDING: Duration = Duration::from_millis(50);

/// A client connected to a peer the test scripts by hand.
struct Harness {
    // ---
    client: RpcClient,
    peer: MemoryPeer,
    _hub: Arc<MemoryHub>,
}

impl Harness {
    // ---
    async fn new(id: &str) -> Result<Self> {
        // ---
        init_logging();
        log::info!("harness {id}: connecting");

        let hub = MemoryHub::new();
        let mut listener = hub.listen(id)?;

        let config = TransportConfig {
            uri: format!("memory://{id}"),
            node_id: id.to_string(),
            transport_type: None,
        };
        let transport = create_memory_transport_with_hub(config, hub.clone()).await?;
        let client = RpcClientBuilder::new(transport).build().await?;
        let peer = listener.accept().await.expect("listener closed");

        Ok(Self {
            client,
            peer,
            _hub: hub,
        })
    }

    /// Next call envelope the client sent.
    async fn next_call(&mut self) -> CallEnvelope {
        // ---
        let text = timeout(WAIT, self.peer.recv())
            .await
            .expect("timed out waiting for a call")
            .expect("connection closed");
        CallEnvelope::from_text(&text).expect("client sent a malformed envelope")
    }
}

/// Answers calls like a toy server: `add` sums its arguments, everything
/// else echoes the function name.
fn serve(mut peer: MemoryPeer) -> tokio::task::JoinHandle<()> {
    // ---
    tokio::spawn(async move {
        while let Some(text) = peer.recv().await {
            let env = match CallEnvelope::from_text(&text) {
                Ok(env) if env.is_call() => env,
                _ => continue,
            };

            let reply = match env.function.as_str() {
                "add" => {
                    let sum: i64 = env.args.iter().filter_map(Value::as_i64).sum();
                    json!({"id": env.id, "result": sum})
                }
                other => json!({"id": env.id, "result": other}),
            };

            if peer.send(reply.to_string()).await.is_err() {
                break;
            }
        }
    })
}

#[tokio::test]
async fn test_round_trip_add() -> Result<()> {
    // ---
    let mut h = Harness::new("round_trip").await?;

    let call = h.client.start_call("add", (2, 3)).await?;

    let sent = h.next_call().await;
    assert_eq!(
        serde_json::to_string(&sent)?,
        r#"{"type":"rpc-call","function":"add","args":[2,3],"id":0}"#
    );

    h.peer.send(r#"{"id":0,"result":5}"#).await?;

    let reply = timeout(WAIT, call).await.expect("no reply")?;
    assert_eq!(reply, json!({"id": 0, "result": 5}));
    assert_eq!(h.client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_concurrent_calls_get_distinct_ids_and_own_replies() -> Result<()> {
    // ---
    let h = Harness::new("concurrent").await?;
    let _server = serve(h.peer);

    let mut handles = Vec::new();

    for i in 0..10i64 {
        // ---
        let c = h.client.clone();

        handles.push(tokio::spawn(async move {
            let reply = c.call("add", (i, i)).await.unwrap();
            (reply["id"].as_u64().unwrap(), reply["result"].as_i64().unwrap())
        }));
    }

    let mut ids = HashSet::new();
    for (i, task) in handles.into_iter().enumerate() {
        let (id, sum) = timeout(WAIT, task).await.expect("call hung").unwrap();
        assert_eq!(sum, (i as i64) * 2);
        ids.insert(id);
    }

    assert_eq!(ids.len(), 10);
    assert_eq!(h.client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_replies_in_reverse_order() -> Result<()> {
    // ---
    let mut h = Harness::new("reverse").await?;

    let calls = vec![
        h.client.start_call("a", ()).await?,
        h.client.start_call("b", ()).await?,
        h.client.start_call("c", ()).await?,
    ];
    for _ in 0..3 {
        h.next_call().await;
    }

    for id in (0..3).rev() {
        h.peer.send(json!({"id": id, "tag": id * 10}).to_string()).await?;
    }

    for (id, call) in calls.into_iter().enumerate() {
        let reply = timeout(WAIT, call).await.expect("no reply")?;
        assert_eq!(reply["tag"], json!(id * 10));
    }
    Ok(())
}

#[tokio::test]
async fn test_out_of_order_leaves_earlier_call_pending() -> Result<()> {
    // ---
    let mut h = Harness::new("out_of_order").await?;

    let mut f = h.client.start_call("f", ()).await?;
    let g = h.client.start_call("g", ()).await?;
    assert_eq!((f.id().get(), g.id().get()), (0, 1));

    assert_eq!(h.next_call().await.function, "f");
    assert_eq!(h.next_call().await.function, "g");

    h.peer.send(r#"{"id":1,"result":"g-done"}"#).await?;

    let g_reply = timeout(WAIT, g).await.expect("g never resolved")?;
    assert_eq!(g_reply["result"], "g-done");

    assert!(timeout(STILL_PENDING, &mut f).await.is_err());
    assert_eq!(h.client.pending_count(), 1);

    h.peer.send(r#"{"id":0,"result":"f-done"}"#).await?;
    let f_reply = timeout(WAIT, f).await.expect("f never resolved")?;
    assert_eq!(f_reply["result"], "f-done");
    Ok(())
}

#[tokio::test]
async fn test_duplicate_reply_resolves_once() -> Result<()> {
    // ---
    let mut h = Harness::new("duplicate").await?;

    let first = h.client.start_call("f", ()).await?;
    let second = h.client.start_call("g", ()).await?;
    h.next_call().await;
    h.next_call().await;

    h.peer.send(r#"{"id":0,"n":1}"#).await?;
    h.peer.send(r#"{"id":0,"n":2}"#).await?;
    h.peer.send(r#"{"id":1,"n":3}"#).await?;

    assert_eq!(timeout(WAIT, first).await.expect("no reply")?["n"], 1);
    assert_eq!(timeout(WAIT, second).await.expect("no reply")?["n"], 3);
    assert_eq!(h.client.pending_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_malformed_and_unmatched_frames_are_ignored() -> Result<()> {
    // ---
    let mut h = Harness::new("malformed").await?;

    let mut call = h.client.start_call("f", ()).await?;
    h.next_call().await;

    h.peer.send("this is not json").await?;
    h.peer.send(r#"{"result":"no id"}"#).await?;
    h.peer.send(r#"{"id":"zero"}"#).await?;
    h.peer.send(r#"{"id":42,"result":"stray"}"#).await?;

    assert!(timeout(STILL_PENDING, &mut call).await.is_err());
    assert_eq!(h.client.pending_count(), 1);
    assert!(!h.client.is_closed());

    h.peer.send(r#"{"id":0,"result":"ok"}"#).await?;
    let reply = timeout(WAIT, call).await.expect("no reply")?;
    assert_eq!(reply["result"], "ok");
    Ok(())
}

#[tokio::test]
async fn test_string_id_reply_correlates() -> Result<()> {
    // ---
    let mut h = Harness::new("string_id").await?;

    let call = h.client.start_call("f", ()).await?;
    h.next_call().await;

    h.peer.send(r#"{"id":"0","result":true}"#).await?;
    let reply = timeout(WAIT, call).await.expect("no reply")?;
    assert_eq!(reply["result"], true);
    Ok(())
}

#[tokio::test]
async fn test_peer_close_rejects_every_pending_call() -> Result<()> {
    // ---
    let mut h = Harness::new("peer_close").await?;

    let mut calls = Vec::new();
    for name in ["a", "b", "c", "d"] {
        calls.push(h.client.start_call(name, ()).await?);
    }
    for _ in 0..4 {
        h.next_call().await;
    }

    h.peer.close().await;

    for call in calls {
        let res = timeout(WAIT, call).await.expect("call never rejected");
        assert!(matches!(res, Err(RpcError::ConnectionClosed)));
    }
    assert_eq!(h.client.pending_count(), 0);
    assert!(h.client.is_closed());

    let res = h.client.call("late", ()).await;
    assert!(matches!(res, Err(RpcError::Transport(_))));
    Ok(())
}

#[tokio::test]
async fn test_call_as_decodes_reply() -> Result<()> {
    // ---
    #[derive(Debug, Deserialize)]
    struct AddReply {
        id: u64,
        result: i64,
    }

    let h = Harness::new("call_as").await?;
    let _server = serve(h.peer);

    let reply: AddReply = h.client.call_as("add", vec![20, 3]).await?;
    assert_eq!(reply.id, 0);
    assert_eq!(reply.result, 23);

    let res: Result<AddReply> = h.client.call_as("echo", ("x",)).await;
    assert!(matches!(res, Err(RpcError::Encoding(_))));
    Ok(())
}

#[tokio::test]
async fn test_second_client_on_same_transport_is_refused() -> Result<()> {
    // ---
    let h = Harness::new("second_client").await?;

    let res = RpcClientBuilder::new(h.client.transport()).build().await;
    assert!(matches!(res, Err(RpcError::Transport(_))));
    Ok(())
}

#[cfg(feature = "logging")]
mod imp {
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init() {
        INIT.call_once(|| {
            let _ = env_logger::builder().is_test(true).try_init();
        });
    }
}

#[cfg(not(feature = "logging"))]
mod imp {
    #[inline]
    pub fn init() {}
}

pub fn init_logging() {
    imp::init();
}
