// rust_websocket_utils/tests/client_transport_integration_test.rs

use futures_util::{SinkExt, StreamExt};
use log::{info, LevelFilter};
use rust_websocket_utils::event::{CLOSE_ABNORMAL, CLOSE_NORMAL};
use rust_websocket_utils::{Connector, TransportEvent, TransportHandle, TransportSignal, WsConnector};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Message};

// 辅助函数：初始化日志，仅用于测试，避免多次初始化
fn init_test_logger() {
    let _ = env_logger::builder().filter_level(LevelFilter::Debug).is_test(true).try_init();
}

/// 测试服务端在收到第一个连接后的行为。
#[derive(Clone, Copy)]
enum ServerBehaviour {
    /// 原样回显所有文本消息，直到客户端关闭。
    Echo,
    /// 立即以指定状态码关闭连接。
    CloseWith(u16),
    /// 不经关闭握手直接断开 TCP。
    Drop,
    /// 握手后既不读取也不回应，连接一直保持打开。
    Silent,
}

async fn start_test_server(behaviour: ServerBehaviour) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("无法绑定到随机端口");
    let addr = listener.local_addr().expect("无法获取本地监听地址");
    tokio::spawn(async move {
        let (tcp, peer) = listener.accept().await.expect("接受 TCP 连接失败");
        let mut ws = tokio_tungstenite::accept_async(tcp).await.expect("WebSocket 握手失败");
        info!("[测试服务端] 接受来自 {} 的连接", peer);
        match behaviour {
            ServerBehaviour::Echo => {
                while let Some(Ok(msg)) = ws.next().await {
                    if let Message::Text(text) = msg {
                        if ws.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
            }
            ServerBehaviour::CloseWith(code) => {
                let frame = CloseFrame { code: CloseCode::from(code), reason: "server closing".into() };
                let _ = ws.close(Some(frame)).await;
                while let Some(Ok(_)) = ws.next().await {}
            }
            ServerBehaviour::Drop => drop(ws),
            ServerBehaviour::Silent => {
                tokio::time::sleep(Duration::from_secs(30)).await;
                drop(ws);
            }
        }
    });
    addr
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> TransportSignal {
    timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("等待传输层信号超时")
        .expect("信号通道意外关闭")
}

/// 跳过错误事件，直到连接关闭。
async fn wait_for_close(rx: &mut mpsc::UnboundedReceiver<TransportSignal>) -> u16 {
    loop {
        match next_event(rx).await.event {
            TransportEvent::Closed(info) => return info.code,
            TransportEvent::Error(e) => info!("[测试客户端] 关闭前收到错误事件: {}", e),
            other => panic!("关闭前收到非预期事件: {:?}", other),
        }
    }
}

#[tokio::test]
async fn test_client_open_send_receive_and_close_cleanly() {
    init_test_logger();
    let addr = start_test_server(ServerBehaviour::Echo).await;
    let (tx, mut rx) = mpsc::unbounded_channel();

    let handle = WsConnector::new()
        .open(&format!("ws://{}", addr), 7, tx)
        .expect("打开连接不应同步失败");

    let opened = next_event(&mut rx).await;
    assert_eq!(opened.connection_id, 7);
    assert_eq!(opened.event, TransportEvent::Opened);

    handle.send_text(r#"{"type":"ping"}"#.to_string()).expect("发送消息失败");
    let echoed = next_event(&mut rx).await;
    assert_eq!(echoed.event, TransportEvent::Message(r#"{"type":"ping"}"#.to_string()));

    handle.close(CLOSE_NORMAL, "client done");
    assert_eq!(wait_for_close(&mut rx).await, CLOSE_NORMAL);
}

#[tokio::test]
async fn test_server_close_code_is_reported() {
    init_test_logger();
    let addr = start_test_server(ServerBehaviour::CloseWith(4001)).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = WsConnector::new().open(&format!("ws://{}", addr), 1, tx).unwrap();

    assert_eq!(next_event(&mut rx).await.event, TransportEvent::Opened);
    assert_eq!(wait_for_close(&mut rx).await, 4001);
}

#[tokio::test]
async fn test_dropped_connection_reports_abnormal_close() {
    init_test_logger();
    let addr = start_test_server(ServerBehaviour::Drop).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = WsConnector::new().open(&format!("ws://{}", addr), 1, tx).unwrap();

    // 握手完成后服务端立即断开，Opened 之后应得到 1006
    assert_eq!(next_event(&mut rx).await.event, TransportEvent::Opened);
    assert_eq!(wait_for_close(&mut rx).await, CLOSE_ABNORMAL);
}

#[tokio::test]
async fn test_refused_connection_reports_error_then_abnormal_close() {
    init_test_logger();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let _handle = WsConnector::new()
        .open(&format!("ws://{}", addr), 3, tx)
        .expect("打开是异步失败，不应同步返回错误");

    let first = next_event(&mut rx).await;
    assert_eq!(first.connection_id, 3);
    assert!(matches!(first.event, TransportEvent::Error(_)), "应先收到错误事件: {:?}", first.event);
    assert_eq!(wait_for_close(&mut rx).await, CLOSE_ABNORMAL);
}

#[tokio::test]
async fn test_local_close_gives_up_when_peer_never_answers() {
    init_test_logger();
    let addr = start_test_server(ServerBehaviour::Silent).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let handle = WsConnector::new()
        .with_close_timeout(Duration::from_millis(200))
        .open(&format!("ws://{}", addr), 5, tx)
        .unwrap();

    assert_eq!(next_event(&mut rx).await.event, TransportEvent::Opened);
    handle.close(CLOSE_NORMAL, "client done");

    // 对端不回应关闭帧时，连接任务应在等待上限后自行结束，而不是等到服务端断开
    let closed = timeout(Duration::from_secs(3), wait_for_close(&mut rx))
        .await
        .expect("关闭握手超时后应结束连接任务");
    assert_eq!(closed, CLOSE_NORMAL);
}
