use std::{sync::Arc, time::Duration};

use monoio::net::TcpListener;
use monoio_ws_session::{
    ConnectionId, Frame, OpCode, Registry, ServerConfig,
    protocol::frame::coding::{Control, Data},
    serve,
};

// Echoes text and binary frames, answers pings. Everything else is only logged.
fn handle_frame(id: ConnectionId, frame: Frame) -> Option<Frame> {
    match frame.opcode() {
        OpCode::Data(Data::Text) | OpCode::Data(Data::Binary) => {
            log::info!("{id} <- {:?}", frame.payload());
            Some(Frame::message(
                frame.payload().clone(),
                frame.opcode(),
                frame.fin(),
            ))
        }
        OpCode::Control(Control::Ping) => Some(Frame::pong(frame.into_payload())),
        opcode => {
            log::debug!("{id}: ignoring {opcode} frame");
            None
        }
    }
}

#[monoio::main(enable_timer = true)]
async fn main() {
    env_logger::init();

    let addr = "127.0.0.1:8972";
    let listener = TcpListener::bind(addr).expect("Can't listen");
    log::info!("echo server started on {addr}");

    let config = ServerConfig::default().tick_interval(Some(Duration::from_secs(1)));
    if let Err(e) = serve(listener, Arc::new(Registry::new()), config, handle_frame).await {
        log::error!("server stopped: {e}");
    }
}
