use serde::{Deserialize, Serialize};

/// Which portal the workstation is currently displaying. Only the staff
/// portal is tracking-eligible; client/admin screens and the login page must
/// never be tracked or screenshotted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum PortalContext {
    Staff,
    Client,
    Admin,
    Login,
}

impl PortalContext {
    pub fn is_trackable(&self) -> bool {
        matches!(self, PortalContext::Staff)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    Ineligible,
}

/// Outcome of feeding one navigation event through the gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateTransition {
    /// Crossed ineligible -> eligible: tracking services must be initialized.
    BecameEligible,
    /// Crossed eligible -> ineligible: tracking services must be stopped.
    BecameIneligible,
    Unchanged,
}

/// Binary tracking-eligibility state machine, driven solely by navigation
/// events. Starts ineligible: nothing tracks until the shell lands on the
/// staff portal.
#[derive(Debug)]
pub struct ContextGate {
    state: Eligibility,
    context: PortalContext,
}

impl ContextGate {
    pub fn new() -> Self {
        Self {
            state: Eligibility::Ineligible,
            context: PortalContext::Login,
        }
    }

    pub fn eligibility(&self) -> Eligibility {
        self.state
    }

    pub fn is_eligible(&self) -> bool {
        self.state == Eligibility::Eligible
    }

    pub fn context(&self) -> PortalContext {
        self.context
    }

    pub fn on_navigation(&mut self, context: PortalContext) -> GateTransition {
        self.context = context;
        let next = if context.is_trackable() {
            Eligibility::Eligible
        } else {
            Eligibility::Ineligible
        };

        if next == self.state {
            return GateTransition::Unchanged;
        }

        self.state = next;
        match next {
            Eligibility::Eligible => GateTransition::BecameEligible,
            Eligibility::Ineligible => GateTransition::BecameIneligible,
        }
    }
}

impl Default for ContextGate {
    fn default() -> Self {
        Self::new()
    }
}
