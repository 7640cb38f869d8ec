use crate::scheduler::{Applied, Monitor};
use crate::source::Endpoint;
use nfsmon_core::{ClientId, StateDetail, StateId};
use std::convert::Infallible;

/// Last fetched detail of one selected state. `None` until the first
/// response lands.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateSummaryView {
    pub client_id: ClientId,
    pub state_id: StateId,
    pub detail: Option<StateDetail>,
}

#[derive(Debug)]
pub struct StateSummaryMonitor {
    client_id: ClientId,
    state_id: StateId,
}

impl StateSummaryMonitor {
    pub fn new(client_id: ClientId, state_id: StateId) -> Self {
        Self {
            client_id,
            state_id,
        }
    }
}

impl Monitor for StateSummaryMonitor {
    type Payload = StateDetail;
    type View = StateSummaryView;
    type Command = Infallible;

    fn name(&self) -> &'static str {
        "state_summary"
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::State {
            client: self.client_id.clone(),
            state: self.state_id.clone(),
        }
    }

    fn initial_view(&self) -> StateSummaryView {
        StateSummaryView {
            client_id: self.client_id.clone(),
            state_id: self.state_id.clone(),
            detail: None,
        }
    }

    fn apply(&mut self, view: &mut StateSummaryView, payload: StateDetail) -> Applied {
        if view.detail.as_ref() == Some(&payload) {
            return Applied::changed(false);
        }
        view.detail = Some(payload);
        Applied::changed(true)
    }

    fn command(&mut self, _view: &mut StateSummaryView, command: Infallible) -> bool {
        match command {}
    }
}
