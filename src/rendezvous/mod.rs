pub mod client;
pub mod protocol;
pub mod server;

pub use client::RendezvousClient;
pub use protocol::RendezvousMessage;
pub use server::run_server;

use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;

use crate::protocol::MAX_FILE_SIZE;

/// Default rendezvous port
pub const DEFAULT_PORT: u16 = 9000;

/// A whole-file payload travels as one frame, so both sides must accept
/// messages somewhat larger than the file size cap.
const WS_MESSAGE_LIMIT: usize = MAX_FILE_SIZE as usize + 64 * 1024;

pub(crate) fn ws_config() -> WebSocketConfig {
    let mut config = WebSocketConfig::default();
    config.max_message_size = Some(WS_MESSAGE_LIMIT);
    config.max_frame_size = Some(WS_MESSAGE_LIMIT);
    config
}
