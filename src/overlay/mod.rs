//! Overlay presentation state
//!
//! Pure view state for the in-page overlay: the header's estimate and cost
//! lines, and one [`section::SectionState`] per tracked model. No rendering
//! happens here; a frontend mirrors these values into whatever surface it
//! owns. Keeping the state plain data is what makes the pipeline ordering
//! guarantees testable.

pub mod pipeline;
pub mod section;

pub use pipeline::UpdatePipeline;
pub use section::{BarColor, SectionState};

/// Always-visible header lines of the overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct HeaderView {
    pub estimate_text: String,
    pub cost_text: String,
}

impl HeaderView {
    pub fn new() -> Self {
        Self {
            estimate_text: "Est. messages left: Loading...".to_string(),
            cost_text: "Current cost: 0 tokens".to_string(),
        }
    }

    /// Direct override used on the transition onto the home page, bypassing
    /// the pipeline entirely.
    pub fn force_not_applicable(&mut self) {
        self.estimate_text = "Est. messages left: N/A".to_string();
        self.cost_text = "Current cost: N/A tokens".to_string();
    }
}

impl Default for HeaderView {
    fn default() -> Self {
        Self::new()
    }
}
