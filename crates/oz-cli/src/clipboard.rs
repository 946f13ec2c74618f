//! System clipboard via arboard.

use oz_core::{Clipboard, Error};

/// Clipboard handle opened on first use.
///
/// Opening fails on headless sessions; that surfaces as a copy failure
/// notice and the next copy tries again.
#[derive(Default)]
pub struct SystemClipboard {
    inner: Option<arboard::Clipboard>,
}

impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }

    fn handle(&mut self) -> oz_core::Result<&mut arboard::Clipboard> {
        if self.inner.is_none() {
            let clipboard =
                arboard::Clipboard::new().map_err(|e| Error::clipboard(e.to_string()))?;
            self.inner = Some(clipboard);
        }
        self.inner
            .as_mut()
            .ok_or_else(|| Error::clipboard("clipboard unavailable"))
    }
}

impl Clipboard for SystemClipboard {
    fn set_text(&mut self, text: &str) -> oz_core::Result<()> {
        let result = self
            .handle()?
            .set_text(text.to_string())
            .map_err(|e| Error::clipboard(e.to_string()));
        if result.is_err() {
            // Drop a broken handle so the retry reopens it.
            self.inner = None;
        }
        result
    }
}
