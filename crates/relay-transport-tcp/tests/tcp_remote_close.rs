//! Demonstrates a real asynchronous child-close notification flowing back
//! into an engine from a different thread than its own runloop (§9,
//! thread-confinement note): `TcpRemote::close` runs the graceful-close
//! sequence on a Tokio worker thread and calls `notify_remote_closed` from
//! there, which the engine hops off of and onto its own runloop thread
//! before touching any registry.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use relay_engine::{EngineConfig, EngineHandle, EngineId, RemoteKey, RemoteLocator};
use relay_transport_tcp::{TcpRemote, TcpSocketConfig};
use tokio::net::{TcpListener, TcpStream};

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn closing_engine_drives_real_tcp_remote_to_completion() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let (client_res, server_res) = tokio::join!(TcpStream::connect(addr), async {
        listener.accept().await.map(|(stream, _)| stream)
    });
    let client = client_res.unwrap();
    let server = server_res.unwrap();

    // The peer side: just drain until EOF so the graceful close can
    // complete, then drop.
    tokio::spawn(async move {
        use tokio::io::AsyncReadExt;
        let mut client = client;
        let mut buf = [0u8; 64];
        loop {
            match client.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    });

    let engine = EngineHandle::with_own_runloop(EngineConfig::builder(EngineId::new("tcp-demo")).build());

    let remote = Arc::new(TcpRemote::new(server, TcpSocketConfig::default()).unwrap());
    let key = RemoteKey::new("peer-1");
    engine.insert_remote(key.clone(), remote.clone());
    remote.set_locator(RemoteLocator::Promoted(key));

    let closed = Arc::new(AtomicBool::new(false));
    let closed_flag = closed.clone();
    engine
        .set_on_closed(move || {
            closed_flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    engine.close_async();

    // Poll for completion: the close runs on the tokio worker thread that
    // spawned TcpRemote's graceful-close task, then hops onto the engine's
    // own runloop thread to call on_close/do_close.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !closed.load(Ordering::SeqCst) && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert!(closed.load(Ordering::SeqCst), "engine never reported closed");
}
