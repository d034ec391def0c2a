//! Per-model section state machine
//!
//! One section per catalog model. Two inputs drive the machine: whether the
//! section's model is the active one, and whether the page is the home view.
//! Portrait viewports additionally hide every inactive section.
//!
//! | active | home page | visibility | collapsed |
//! |--------|-----------|------------|-----------|
//! | yes    | any       | visible    | expanded  |
//! | no     | yes       | visible    | collapsed |
//! | no     | no        | hidden     | n/a       |
//!
//! Collapse is re-asserted only on an active/inactive transition. Between
//! transitions a manual toggle wins, including on the active section.

/// Progress bar color, switched by the warning threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BarColor {
    #[default]
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SectionState {
    pub model: String,
    pub is_active: bool,
    pub is_collapsed: bool,
    pub visible: bool,
    /// Bar width, clamped to [0, 100].
    pub bar_width_pct: f64,
    pub bar_color: BarColor,
    /// Unclamped percentage, as shown in the tooltip.
    pub last_percentage: f64,
    pub last_tooltip: String,
    pub counter_text: String,
    pub reset_text: String,
}

impl SectionState {
    pub fn new(model: &str, is_active: bool, mobile: bool) -> Self {
        Self {
            model: model.to_string(),
            is_active,
            is_collapsed: !is_active,
            visible: !(mobile && !is_active),
            bar_width_pct: 0.0,
            bar_color: BarColor::Normal,
            last_percentage: 0.0,
            last_tooltip: String::new(),
            counter_text: "Messages: 0".to_string(),
            reset_text: "Reset in: Not set".to_string(),
        }
    }

    /// Apply the policy table for the current page context. Visibility is
    /// recomputed unconditionally (the viewport may have rotated); collapse
    /// only moves on an activity transition.
    pub fn set_active(&mut self, active: bool, is_home: bool, mobile: bool) {
        let transitioned = self.is_active != active;
        self.is_active = active;

        self.visible = if !is_home || mobile { active } else { true };

        if transitioned {
            self.is_collapsed = !active;
        }
    }

    /// Manual collapse toggle, honored until the next activity transition.
    pub fn toggle_collapsed(&mut self) {
        self.is_collapsed = !self.is_collapsed;
    }
}
