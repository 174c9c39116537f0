use crate::error::{PlayerError, Result};
use overlyric_core::{CoreError, MediaCommand, PlayerConfig, TransportControl};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use url::Url;

const LOG_TARGET: &str = "overlyric::player::transport";

/// Commands waiting for delivery before `send` starts rejecting new ones.
const COMMAND_QUEUE_CAPACITY: usize = 32;

/// Sends media commands to the playback source as `GET <command_path>?action=<name>`.
///
/// `send` only queues the command, so it is safe to call from the native
/// message pump. A single task on the runtime delivers queued commands one at
/// a time, in the order they were sent.
pub struct HttpTransport {
    commands: mpsc::Sender<MediaCommand>,
}

impl HttpTransport {
    /// Create a transport whose delivery task runs on `runtime`.
    ///
    /// # Errors
    ///
    /// Returns an error if the command URL is invalid or the HTTP client cannot
    /// be created.
    pub fn new(config: &PlayerConfig, runtime: Handle) -> Result<Self> {
        let url = Url::parse(&config.base_url)?.join(&config.command_path)?;
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .build()?;
        let (commands, queue) = mpsc::channel(COMMAND_QUEUE_CAPACITY);
        runtime.spawn(deliver(client, url, queue));
        Ok(Self { commands })
    }
}

fn command_url(base: &Url, command: MediaCommand) -> Url {
    let mut url = base.clone();
    url.query_pairs_mut().append_pair("action", command.as_str());
    url
}

async fn deliver(client: reqwest::Client, base: Url, mut queue: mpsc::Receiver<MediaCommand>) {
    while let Some(command) = queue.recv().await {
        let url = command_url(&base, command);
        debug!(target: LOG_TARGET, "Sending {} to {}", command, url);
        if let Err(e) = send_command(&client, url).await {
            warn!(target: LOG_TARGET, "Player did not accept {}: {}", command, e);
        }
    }
    debug!(target: LOG_TARGET, "Command delivery stopped");
}

async fn send_command(client: &reqwest::Client, url: Url) -> Result<()> {
    let response = client.get(url).send().await?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(PlayerError::Status {
            status: status.as_u16(),
        })
    }
}

impl TransportControl for HttpTransport {
    fn send(&self, command: MediaCommand) -> std::result::Result<(), CoreError> {
        self.commands
            .try_send(command)
            .map_err(|e| CoreError::TransportFailed {
                command: command.to_string(),
                reason: match e {
                    TrySendError::Full(_) => "command queue is full".to_string(),
                    TrySendError::Closed(_) => "command delivery has stopped".to_string(),
                },
            })
    }
}
