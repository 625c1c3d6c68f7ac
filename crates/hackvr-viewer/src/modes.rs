//! Interaction mode gates: text input and raycast.
//!
//! Both modes are explicit automata. Text-input mode opens on
//! `request-input` and closes on `cancel-input` or when the viewer submits
//! `send-input`; a replacing `request-input` must not clear a draft the user
//! already typed. Raycast mode opens on `raycast-request` (idempotent) and
//! closes on `raycast-cancel` from either side or when the viewer emits one
//! `raycast`. Neither mode times out.

/// State behind the text-input and raycast gates.
#[derive(Debug, Default)]
pub struct InteractionModes {
    text_input: bool,
    raycast: bool,
    prompt: Option<String>,
    draft: Option<String>,
}

impl InteractionModes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text_input_active(&self) -> bool {
        self.text_input
    }

    pub fn raycast_active(&self) -> bool {
        self.raycast
    }

    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref()
    }

    pub fn draft(&self) -> Option<&str> {
        self.draft.as_deref()
    }

    /// `request-input` (S→C). A repeat replaces the prompt but never a draft
    /// the user already holds; the default only seeds an empty draft.
    pub fn on_request_input(&mut self, prompt: String, default: Option<String>) {
        self.text_input = true;
        self.prompt = Some(prompt);
        if self.draft.is_none() {
            self.draft = default;
        }
    }

    /// `cancel-input` (S→C). The draft survives; the user may get the mode
    /// back and expects their text intact.
    pub fn on_cancel_input(&mut self) {
        self.text_input = false;
        self.prompt = None;
    }

    /// The user edited the draft.
    pub fn set_draft(&mut self, draft: String) {
        self.draft = Some(draft);
    }

    /// The user submits. Valid only while the mode is open; returns the text
    /// to put in `send-input` and closes the mode.
    pub fn take_send_input(&mut self) -> Option<String> {
        if !self.text_input {
            return None;
        }
        self.text_input = false;
        self.prompt = None;
        Some(self.draft.take().unwrap_or_default())
    }

    /// `raycast-request` (S→C); idempotent.
    pub fn on_raycast_request(&mut self) {
        self.raycast = true;
    }

    /// `raycast-cancel`, from either direction.
    pub fn on_raycast_cancel(&mut self) {
        self.raycast = false;
    }

    /// Gate one `raycast` emission: true exactly once per open mode.
    pub fn take_raycast(&mut self) -> bool {
        std::mem::take(&mut self.raycast)
    }
}
