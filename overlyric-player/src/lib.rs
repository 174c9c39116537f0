pub mod cover;
pub mod error;
pub mod poller;
pub mod transport;

pub use cover::HttpCoverSource;
pub use error::PlayerError;
pub use poller::{NowPlayingPayload, NowPlayingPoller};
pub use transport::HttpTransport;
