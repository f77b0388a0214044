//! Clipboard abstraction for the locator-autofill workaround

use anyhow::{anyhow, Result};

/// Minimal clipboard surface the connection manager needs.
///
/// Failures here are always logged and swallowed by the caller; the join
/// flow proceeds without the clipboard.
pub trait Clipboard: Send + Sync {
    fn read(&self) -> Result<String>;
    fn write(&self, text: &str) -> Result<()>;
}

/// System clipboard backed by `arboard`
pub struct SystemClipboard;

impl Clipboard for SystemClipboard {
    fn read(&self) -> Result<String> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {}", e))?;
        clipboard
            .get_text()
            .map_err(|e| anyhow!("Clipboard read failed: {}", e))
    }

    fn write(&self, text: &str) -> Result<()> {
        let mut clipboard =
            arboard::Clipboard::new().map_err(|e| anyhow!("Clipboard unavailable: {}", e))?;
        clipboard
            .set_text(text.to_owned())
            .map_err(|e| anyhow!("Clipboard write failed: {}", e))
    }
}
