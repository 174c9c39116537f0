//! HTTP lyric providers.

pub mod endpoint;
pub mod lrclib;

pub use endpoint::EndpointProvider;
pub use lrclib::LrclibProvider;

use overlyric_core::{LyricsConfig, LyricsProvider, LyricsProviderConfig};
use tracing::{error, info};

const LOG_TARGET: &str = "overlyric::lyrics";

/// Build the provider chain in configured order.
///
/// A provider whose client cannot be created is logged and left out.
#[must_use]
pub fn build_providers(config: &LyricsConfig) -> Vec<Box<dyn LyricsProvider>> {
    config
        .providers
        .iter()
        .filter_map(|provider| -> Option<Box<dyn LyricsProvider>> {
            let built = match provider {
                LyricsProviderConfig::Lrclib => {
                    LrclibProvider::new(config.timeout()).map(|p| Box::new(p) as Box<dyn LyricsProvider>)
                }
                LyricsProviderConfig::Endpoint { name, url } => {
                    EndpointProvider::new(name.clone(), url.clone(), config.timeout())
                        .map(|p| Box::new(p) as Box<dyn LyricsProvider>)
                }
            };
            match built {
                Ok(provider) => {
                    info!(target: LOG_TARGET, "Initialized lyrics provider: {}", provider.name());
                    Some(provider)
                }
                Err(e) => {
                    error!(target: LOG_TARGET, "Failed to create lyrics provider {:?}: {}", provider, e);
                    None
                }
            }
        })
        .collect()
}
