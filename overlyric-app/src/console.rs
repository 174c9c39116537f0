//! Terminal stand-in for the overlay window: prints each line as it becomes active.

use overlyric_core::{AnimationState, DisplayMode, SongIdentity};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Decides when the animation state shows something new worth printing.
///
/// Cross-fade and scroll progress are ignored; only a change of song, mode or
/// active line produces output.
#[derive(Debug, Default)]
pub struct LinePrinter {
    last: Option<(SongIdentity, DisplayMode, Option<usize>)>,
}

impl LinePrinter {
    pub fn update(&mut self, animation: &AnimationState) -> Option<String> {
        let key = (
            animation.identity.clone(),
            animation.display,
            animation.current_index,
        );
        if self.last.as_ref() == Some(&key) {
            return None;
        }
        let song_changed = !matches!(
            &self.last,
            Some((identity, _, _)) if *identity == animation.identity
        );
        self.last = Some(key);

        let line = match animation.display {
            DisplayMode::Placeholder if animation.identity.is_empty() => {
                "(nothing playing)".to_string()
            }
            DisplayMode::Placeholder => "(no lyrics)".to_string(),
            DisplayMode::Unsynced => {
                let text = animation.plain_text.as_deref().unwrap_or_default();
                format!("(unsynced lyrics, {} lines)", text.lines().count())
            }
            DisplayMode::Synced => match animation.current_text.as_deref() {
                Some(text) if !text.is_empty() => format!("  {text}"),
                _ => "  \u{266a}".to_string(),
            },
        };

        if song_changed && !animation.identity.is_empty() {
            Some(format!("== {} ==\n{line}", animation.identity))
        } else {
            Some(line)
        }
    }
}

/// Print animation changes until cancelled or the renderer goes away.
pub async fn run(mut animation: watch::Receiver<AnimationState>, cancel: CancellationToken) {
    let mut printer = LinePrinter::default();
    loop {
        tokio::select! {
            () = cancel.cancelled() => break,
            changed = animation.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = animation.borrow_and_update().clone();
                if let Some(line) = printer.update(&state) {
                    println!("{line}");
                }
            }
        }
    }
}
