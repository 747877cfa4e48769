//! Human-in-the-loop prompts.
//!
//! Everything the batch controller needs from the person at the keyboard
//! goes through [`Operator`], so the state machine can be driven by a
//! scripted operator in tests and by [`TerminalOperator`] in a real run.

use crate::errors::Result;
use crate::phone::PhoneIdentity;
use crate::ui::EnrollUI;
use dialoguer::{Confirm, Input, Select, theme::ColorfulTheme};
use std::sync::Arc;

/// Answer to the interactive fallback prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManualSelection {
    /// The operator checked the right entry in the live UI.
    Selected,
    /// The operator could not find the participant.
    Declined,
}

pub trait Operator {
    /// Target size for a batch. Implementations fall back to `default`.
    fn batch_size(&mut self, batch_number: u32, default: usize) -> Result<usize>;

    /// Guide the operator to re-open the participant search. `false` means
    /// they gave up.
    fn recover_search_field(&mut self) -> Result<bool>;

    fn manual_selection(&mut self, identity: &PhoneIdentity) -> Result<ManualSelection>;

    /// New target once a batch is full. `None` closes the batch as-is.
    fn extend_batch(&mut self, batch_number: u32, selected: usize) -> Result<Option<usize>>;

    /// Whether the operator performed the UI "Add" for the selected identities.
    fn confirm_add(&mut self, batch_number: u32, selected: &[PhoneIdentity]) -> Result<bool>;

    fn continue_to_next_batch(&mut self, next_batch: u32) -> Result<bool>;
}

/// Parse a batch size answer. Empty, invalid or zero input gives `default`.
pub fn parse_batch_size(input: &str, default: usize) -> usize {
    match input.trim().parse::<usize>() {
        Ok(n) if n > 0 => n,
        _ => default,
    }
}

/// Parse an extension answer. Anything but a number means "no extension".
pub fn parse_extension(input: &str) -> Option<usize> {
    input.trim().parse::<usize>().ok()
}

/// Prompts on the terminal with `dialoguer`, pausing the progress bar while
/// waiting for an answer.
pub struct TerminalOperator {
    ui: Arc<EnrollUI>,
    theme: ColorfulTheme,
}

impl TerminalOperator {
    pub fn new(ui: Arc<EnrollUI>) -> Self {
        Self {
            ui,
            theme: ColorfulTheme::default(),
        }
    }
}

impl Operator for TerminalOperator {
    fn batch_size(&mut self, batch_number: u32, default: usize) -> Result<usize> {
        let answer: String = self.ui.suspend(|| {
            Input::with_theme(&self.theme)
                .with_prompt(format!("How many participants for batch {}?", batch_number))
                .default(default.to_string())
                .allow_empty(true)
                .interact_text()
        })?;
        Ok(parse_batch_size(&answer, default))
    }

    fn recover_search_field(&mut self) -> Result<bool> {
        self.ui
            .operator("Open the group's \"Add participant\" dialog and click into its search box.");
        let ready = self.ui.suspend(|| {
            Confirm::with_theme(&self.theme)
                .with_prompt("Is the participant search box open?")
                .default(true)
                .interact()
        })?;
        Ok(ready)
    }

    fn manual_selection(&mut self, identity: &PhoneIdentity) -> Result<ManualSelection> {
        self.ui.operator(&format!(
            "Could not match {} automatically. Find and check the contact in the browser.",
            identity
        ));
        let options = &["I have checked the contact", "Skip this number"];
        let selection = self.ui.suspend(|| {
            Select::with_theme(&self.theme)
                .with_prompt(format!("Manual selection for {}", identity))
                .items(options)
                .default(0)
                .interact()
        })?;
        Ok(match selection {
            0 => ManualSelection::Selected,
            _ => ManualSelection::Declined,
        })
    }

    fn extend_batch(&mut self, batch_number: u32, selected: usize) -> Result<Option<usize>> {
        let answer: String = self.ui.suspend(|| {
            Input::with_theme(&self.theme)
                .with_prompt(format!(
                    "Batch {} has {} selected. New target to keep going (Enter to close the batch)",
                    batch_number, selected
                ))
                .allow_empty(true)
                .interact_text()
        })?;
        Ok(parse_extension(&answer))
    }

    fn confirm_add(&mut self, batch_number: u32, selected: &[PhoneIdentity]) -> Result<bool> {
        self.ui.operator(&format!(
            "Batch {}: click \"Add\" in the browser for the {} selected participant(s).",
            batch_number,
            selected.len()
        ));
        let options = &[
            "Done, they were added",
            "Not added, retry them next run",
        ];
        let selection = self.ui.suspend(|| {
            Select::with_theme(&self.theme)
                .with_prompt("Did you add the selected participants?")
                .items(options)
                .default(0)
                .interact()
        })?;
        Ok(selection == 0)
    }

    fn continue_to_next_batch(&mut self, next_batch: u32) -> Result<bool> {
        let answer = self.ui.suspend(|| {
            Confirm::with_theme(&self.theme)
                .with_prompt(format!("Continue with batch {}?", next_batch))
                .default(true)
                .interact()
        })?;
        Ok(answer)
    }
}

/// Operator with canned answers that records which prompts were shown.
#[cfg(test)]
#[derive(Debug, Default)]
pub struct ScriptedOperator {
    pub batch_sizes: std::collections::VecDeque<usize>,
    pub recoveries: std::collections::VecDeque<bool>,
    pub selections: std::collections::VecDeque<ManualSelection>,
    pub extensions: std::collections::VecDeque<Option<usize>>,
    pub confirms: std::collections::VecDeque<bool>,
    pub continues: std::collections::VecDeque<bool>,
    pub prompts: Vec<&'static str>,
}

#[cfg(test)]
impl Operator for ScriptedOperator {
    fn batch_size(&mut self, _batch_number: u32, default: usize) -> Result<usize> {
        self.prompts.push("batch_size");
        Ok(self.batch_sizes.pop_front().unwrap_or(default))
    }

    fn recover_search_field(&mut self) -> Result<bool> {
        self.prompts.push("recover_search_field");
        Ok(self.recoveries.pop_front().unwrap_or(false))
    }

    fn manual_selection(&mut self, _identity: &PhoneIdentity) -> Result<ManualSelection> {
        self.prompts.push("manual_selection");
        Ok(self
            .selections
            .pop_front()
            .unwrap_or(ManualSelection::Declined))
    }

    fn extend_batch(&mut self, _batch_number: u32, _selected: usize) -> Result<Option<usize>> {
        self.prompts.push("extend_batch");
        Ok(self.extensions.pop_front().flatten())
    }

    fn confirm_add(&mut self, _batch_number: u32, _selected: &[PhoneIdentity]) -> Result<bool> {
        self.prompts.push("confirm_add");
        Ok(self.confirms.pop_front().unwrap_or(true))
    }

    fn continue_to_next_batch(&mut self, _next_batch: u32) -> Result<bool> {
        self.prompts.push("continue_to_next_batch");
        Ok(self.continues.pop_front().unwrap_or(false))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_batch_size_falls_back_to_default() {
        assert_eq!(parse_batch_size("", 5), 5);
        assert_eq!(parse_batch_size("abc", 5), 5);
        assert_eq!(parse_batch_size("0", 5), 5);
        assert_eq!(parse_batch_size("-3", 5), 5);
    }

    #[test]
    fn test_batch_size_accepts_positive_numbers() {
        assert_eq!(parse_batch_size("12", 5), 12);
        assert_eq!(parse_batch_size("  3 \n", 5), 3);
    }

    #[test]
    fn test_extension_parsing() {
        assert_eq!(parse_extension(""), None);
        assert_eq!(parse_extension("no"), None);
        assert_eq!(parse_extension("8"), Some(8));
        // Zero parses; the controller rejects it as not above the selection count.
        assert_eq!(parse_extension("0"), Some(0));
    }

    #[test]
    fn test_scripted_operator_defaults() {
        let mut op = ScriptedOperator::default();
        assert_eq!(op.batch_size(1, 5).unwrap(), 5);
        assert_eq!(
            op.manual_selection(&PhoneIdentity::try_from("+911234567890".to_string()).unwrap())
                .unwrap(),
            ManualSelection::Declined
        );
        assert_eq!(op.extend_batch(1, 5).unwrap(), None);
        assert!(op.confirm_add(1, &[]).unwrap());
        assert!(!op.continue_to_next_batch(2).unwrap());
        assert_eq!(op.prompts.len(), 5);
    }
}
