//! Scroll state for the entry list.
//!
//! The list grows from the bottom as batches are appended, so the offset is
//! re-clamped whenever either the viewport or the content height changes.

use oz_core::ScrollMetrics;

/// Viewport-aware scroll offset, in rows.
#[derive(Debug, Clone, Default)]
pub struct ScrollState {
    offset: usize,
    content_height: usize,
    viewport_height: usize,
}

impl ScrollState {
    pub fn offset(&self) -> usize {
        self.offset
    }

    fn max_offset(&self) -> usize {
        self.content_height.saturating_sub(self.viewport_height)
    }

    fn clamp_offset(&mut self) {
        self.offset = self.offset.min(self.max_offset());
    }

    pub fn set_viewport_height(&mut self, height: usize) {
        self.viewport_height = height;
        self.clamp_offset();
    }

    pub fn set_content_height(&mut self, height: usize) {
        self.content_height = height;
        self.clamp_offset();
    }

    pub fn scroll_up(&mut self, amount: usize) {
        self.offset = self.offset.saturating_sub(amount);
    }

    pub fn scroll_down(&mut self, amount: usize) {
        self.offset = self.offset.saturating_add(amount).min(self.max_offset());
    }

    /// Page up (scroll by half viewport).
    pub fn page_up(&mut self) {
        let amount = (self.viewport_height / 2).max(5);
        self.scroll_up(amount);
    }

    /// Page down (scroll by half viewport).
    pub fn page_down(&mut self) {
        let amount = (self.viewport_height / 2).max(5);
        self.scroll_down(amount);
    }

    pub fn scroll_to_top(&mut self) {
        self.offset = 0;
    }

    pub fn scroll_to_bottom(&mut self) {
        self.offset = self.max_offset();
    }

    /// Scroll the least amount that brings rows `start..start + height` into view.
    ///
    /// A span taller than the viewport is aligned to its top.
    pub fn ensure_visible(&mut self, start: usize, height: usize) {
        let end = start.saturating_add(height);
        if start < self.offset || height >= self.viewport_height {
            self.offset = start;
        } else if end > self.offset.saturating_add(self.viewport_height) {
            self.offset = end.saturating_sub(self.viewport_height);
        }
        self.clamp_offset();
    }

    /// Current geometry for the pagination threshold check.
    pub fn metrics(&self) -> ScrollMetrics {
        let clamp = |rows: usize| u32::try_from(rows).unwrap_or(u32::MAX);
        ScrollMetrics {
            offset: clamp(self.offset),
            viewport: clamp(self.viewport_height),
            content: clamp(self.content_height),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state(viewport_height: usize) -> ScrollState {
        let mut state = ScrollState::default();
        state.set_viewport_height(viewport_height);
        state
    }

    #[test]
    fn test_offset_clamped_when_content_shrinks() {
        let mut state = state(10);
        state.set_content_height(50);
        state.scroll_down(30);
        assert_eq!(state.offset(), 30);

        state.set_content_height(20);
        assert_eq!(state.offset(), 10);
    }

    #[test]
    fn test_page_moves_half_viewport_min_five() {
        let mut state = state(6);
        state.set_content_height(100);
        state.page_down();
        assert_eq!(state.offset(), 5);

        state.set_viewport_height(30);
        state.page_down();
        assert_eq!(state.offset(), 20);
        state.page_up();
        assert_eq!(state.offset(), 5);
    }

    #[test]
    fn test_ensure_visible() {
        let mut state = state(10);
        state.set_content_height(100);

        state.ensure_visible(15, 3);
        assert_eq!(state.offset(), 8);

        state.ensure_visible(2, 3);
        assert_eq!(state.offset(), 2);

        // Taller than the viewport: show its top.
        state.ensure_visible(40, 25);
        assert_eq!(state.offset(), 40);
    }

    #[test]
    fn test_scrolls_past_u16_rows() {
        let mut state = state(20);
        state.set_content_height(100_000);
        state.scroll_to_bottom();
        assert_eq!(state.offset(), 99_980);
        state.ensure_visible(70_000, 3);
        assert_eq!(state.offset(), 70_000);
        assert_eq!(state.metrics().content, 100_000);
    }

    #[test]
    fn test_metrics_distance_to_bottom() {
        let mut state = state(10);
        state.set_content_height(40);
        state.scroll_to_bottom();
        let metrics = state.metrics();
        assert_eq!(metrics.offset, 30);
        assert_eq!(metrics.distance_to_bottom(), 0);
    }
}
