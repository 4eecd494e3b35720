//! Touch Contact Tracking
//!
//! Turns per-contact driver reports into [`PointerEvent`]s that list every
//! active contact, the way the gesture engine counts fingers.

use crate::input::events::{PointerAction, PointerEvent, PointerItem, Timestamp, ToolType};
use tracing::debug;

/// Tracks active contacts of one touch panel
#[derive(Debug, Default)]
pub struct TouchState {
    contacts: Vec<PointerItem>,
}

impl TouchState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Contact touched the panel
    pub fn handle_down(
        &mut self,
        pointer_id: i32,
        x: f64,
        y: f64,
        tool_type: ToolType,
        action_time: Timestamp,
    ) -> PointerEvent {
        self.contacts.retain(|item| item.pointer_id != pointer_id);
        self.contacts.push(PointerItem {
            pointer_id,
            display_x: x,
            display_y: y,
            tool_type,
            down_time: action_time,
            pressed: true,
        });
        debug!(
            "Touch down: pointer={}, ({:.1}, {:.1}), contacts={}",
            pointer_id,
            x,
            y,
            self.contacts.len()
        );
        self.snapshot(pointer_id, PointerAction::Down, action_time)
    }

    /// Contact moved; unknown contacts are ignored
    pub fn handle_move(
        &mut self,
        pointer_id: i32,
        x: f64,
        y: f64,
        action_time: Timestamp,
    ) -> Option<PointerEvent> {
        let contact = self
            .contacts
            .iter_mut()
            .find(|item| item.pointer_id == pointer_id)?;
        contact.display_x = x;
        contact.display_y = y;
        Some(self.snapshot(pointer_id, PointerAction::Move, action_time))
    }

    /// Contact lifted; the event still lists it, marked released
    pub fn handle_up(
        &mut self,
        pointer_id: i32,
        x: f64,
        y: f64,
        action_time: Timestamp,
    ) -> Option<PointerEvent> {
        self.release(pointer_id, x, y, PointerAction::Up, action_time)
    }

    pub fn handle_cancel(&mut self, pointer_id: i32, action_time: Timestamp) -> Option<PointerEvent> {
        let (x, y) = self
            .contacts
            .iter()
            .find(|item| item.pointer_id == pointer_id)
            .map(|item| (item.display_x, item.display_y))?;
        self.release(pointer_id, x, y, PointerAction::Cancel, action_time)
    }

    pub fn contact_count(&self) -> usize {
        self.contacts.len()
    }

    pub fn reset(&mut self) {
        self.contacts.clear();
    }

    fn release(
        &mut self,
        pointer_id: i32,
        x: f64,
        y: f64,
        action: PointerAction,
        action_time: Timestamp,
    ) -> Option<PointerEvent> {
        let contact = self
            .contacts
            .iter_mut()
            .find(|item| item.pointer_id == pointer_id)?;
        contact.display_x = x;
        contact.display_y = y;
        contact.pressed = false;

        let event = self.snapshot(pointer_id, action, action_time);
        self.contacts.retain(|item| item.pointer_id != pointer_id);
        debug!(
            "Touch {:?}: pointer={}, contacts={}",
            action,
            pointer_id,
            self.contacts.len()
        );
        Some(event)
    }

    fn snapshot(&self, pointer_id: i32, action: PointerAction, action_time: Timestamp) -> PointerEvent {
        PointerEvent {
            pointer_id,
            action,
            action_time,
            items: self.contacts.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contacts_accumulate() {
        let mut touch = TouchState::new();
        let first = touch.handle_down(0, 10.0, 10.0, ToolType::Finger, 0);
        assert_eq!(first.pointer_count(), 1);

        let second = touch.handle_down(1, 50.0, 60.0, ToolType::Finger, 5);
        assert_eq!(second.pointer_count(), 2);
        assert_eq!(second.pointer_id, 1);
        assert_eq!(touch.contact_count(), 2);
    }

    #[test]
    fn test_up_lists_released_contact() {
        let mut touch = TouchState::new();
        touch.handle_down(0, 10.0, 10.0, ToolType::Knuckle, 0);
        touch.handle_down(1, 20.0, 10.0, ToolType::Knuckle, 0);

        let up = touch.handle_up(1, 21.0, 11.0, 100).unwrap();
        assert_eq!(up.pointer_count(), 2);
        let item = up.acting_item().unwrap();
        assert!(!item.pressed);
        assert_eq!(item.display_x, 21.0);
        assert_eq!(touch.contact_count(), 1);
    }

    #[test]
    fn test_unknown_contact_is_ignored() {
        let mut touch = TouchState::new();
        assert!(touch.handle_move(7, 0.0, 0.0, 0).is_none());
        assert!(touch.handle_up(7, 0.0, 0.0, 0).is_none());
        assert!(touch.handle_cancel(7, 0).is_none());
    }
}
