//! Keyboard input processing for the history browser.

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

/// Input action from keyboard events
#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    /// Character typed into the search field
    Char(char),
    Backspace,
    Delete,
    Left,
    Right,
    Home,
    End,
    /// Select the previous entry
    SelectPrev,
    /// Select the next entry
    SelectNext,
    PageUp,
    PageDown,
    ScrollToTop,
    ScrollToBottom,
    /// Flip newest-first / oldest-first
    ToggleSort,
    /// Move focus to the next code block of the selected entry
    FocusNextBlock,
    /// Expand or collapse the focused code block
    ToggleBlock,
    /// Copy the focused code block, or the whole entry
    Copy,
    /// Ask to clear the whole history
    ClearHistory,
    /// Answer to the clear prompt
    Confirm(bool),
    Help,
    Quit,
}

/// Convert key event to input action.
///
/// While the clear prompt is open only y/n/Esc are accepted.
pub fn key_to_action(key: KeyEvent, confirming: bool) -> Option<InputAction> {
    if confirming {
        return match key.code {
            KeyCode::Char('y') | KeyCode::Char('Y') => Some(InputAction::Confirm(true)),
            KeyCode::Char('n') | KeyCode::Char('N') | KeyCode::Esc => {
                Some(InputAction::Confirm(false))
            }
            _ => None,
        };
    }

    match (key.code, key.modifiers) {
        // Quit
        (KeyCode::Esc, _) => Some(InputAction::Quit),
        (KeyCode::Char('c'), KeyModifiers::CONTROL) => Some(InputAction::Quit),
        (KeyCode::Char('d'), KeyModifiers::CONTROL) => Some(InputAction::Quit),

        // Entries
        (KeyCode::Up, KeyModifiers::NONE) => Some(InputAction::SelectPrev),
        (KeyCode::Down, KeyModifiers::NONE) => Some(InputAction::SelectNext),
        (KeyCode::PageUp, _) => Some(InputAction::PageUp),
        (KeyCode::PageDown, _) => Some(InputAction::PageDown),
        (KeyCode::Home, KeyModifiers::CONTROL) => Some(InputAction::ScrollToTop),
        (KeyCode::End, KeyModifiers::CONTROL) => Some(InputAction::ScrollToBottom),

        // Code blocks
        (KeyCode::Tab, _) => Some(InputAction::FocusNextBlock),
        (KeyCode::Enter, _) => Some(InputAction::ToggleBlock),
        (KeyCode::Char('y'), KeyModifiers::CONTROL) => Some(InputAction::Copy),

        (KeyCode::Char('s'), KeyModifiers::CONTROL) => Some(InputAction::ToggleSort),
        (KeyCode::Char('x'), KeyModifiers::CONTROL) => Some(InputAction::ClearHistory),
        (KeyCode::F(1), _) => Some(InputAction::Help),

        // Search field editing
        (KeyCode::Left, KeyModifiers::NONE) => Some(InputAction::Left),
        (KeyCode::Right, KeyModifiers::NONE) => Some(InputAction::Right),
        (KeyCode::Home, KeyModifiers::NONE) => Some(InputAction::Home),
        (KeyCode::End, KeyModifiers::NONE) => Some(InputAction::End),
        (KeyCode::Backspace, _) => Some(InputAction::Backspace),
        (KeyCode::Delete, _) => Some(InputAction::Delete),
        (KeyCode::Char(c), KeyModifiers::NONE) => Some(InputAction::Char(c)),
        (KeyCode::Char(c), KeyModifiers::SHIFT) => Some(InputAction::Char(c)),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(code: KeyCode, modifiers: KeyModifiers) -> KeyEvent {
        KeyEvent::new(code, modifiers)
    }

    #[test]
    fn test_typing_goes_to_search() {
        assert_eq!(
            key_to_action(key(KeyCode::Char('r'), KeyModifiers::NONE), false),
            Some(InputAction::Char('r'))
        );
        assert_eq!(
            key_to_action(key(KeyCode::Char('R'), KeyModifiers::SHIFT), false),
            Some(InputAction::Char('R'))
        );
    }

    #[test]
    fn test_control_bindings() {
        assert_eq!(
            key_to_action(key(KeyCode::Char('s'), KeyModifiers::CONTROL), false),
            Some(InputAction::ToggleSort)
        );
        assert_eq!(
            key_to_action(key(KeyCode::Char('y'), KeyModifiers::CONTROL), false),
            Some(InputAction::Copy)
        );
        assert_eq!(
            key_to_action(key(KeyCode::Char('x'), KeyModifiers::CONTROL), false),
            Some(InputAction::ClearHistory)
        );
        assert_eq!(
            key_to_action(key(KeyCode::Esc, KeyModifiers::NONE), false),
            Some(InputAction::Quit)
        );
    }

    #[test]
    fn test_confirm_prompt_accepts_only_answers() {
        assert_eq!(
            key_to_action(key(KeyCode::Char('y'), KeyModifiers::NONE), true),
            Some(InputAction::Confirm(true))
        );
        assert_eq!(
            key_to_action(key(KeyCode::Esc, KeyModifiers::NONE), true),
            Some(InputAction::Confirm(false))
        );
        assert_eq!(
            key_to_action(key(KeyCode::Char('s'), KeyModifiers::CONTROL), true),
            None
        );
    }
}
