use crate::scheduler::{Applied, Monitor};
use crate::source::{decode_payload, Endpoint, FetchError};
use nfsmon_core::{
    aggregate_addresses, ClientDetail, ClientId, ReconciledList, Reselect, Selection,
    SessionDetail, SessionId, StateId,
};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// The three per-client state collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateKind {
    Open,
    Delegation,
    Layout,
}

impl StateKind {
    pub const ALL: [StateKind; 3] = [StateKind::Open, StateKind::Delegation, StateKind::Layout];

    pub fn index(self) -> usize {
        match self {
            StateKind::Open => 0,
            StateKind::Delegation => 1,
            StateKind::Layout => 2,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StateKind::Open => "opens",
            StateKind::Delegation => "delegations",
            StateKind::Layout => "layouts",
        }
    }
}

impl fmt::Display for StateKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sorted state ids with their own selection.
#[derive(Debug, Clone, PartialEq)]
pub struct StateList {
    pub ids: ReconciledList<StateId>,
    pub selection: Selection<StateId>,
}

impl Default for StateList {
    fn default() -> Self {
        Self {
            ids: ReconciledList::new(),
            selection: Selection::new(Reselect::NextPass),
        }
    }
}

impl StateList {
    fn apply(&mut self, incoming: Vec<StateId>) -> bool {
        let list_changed = self.ids.reconcile_sorted(incoming).changed();
        let selection_changed = self.selection.reconcile(self.ids.items());
        list_changed || selection_changed
    }

    pub fn selected(&self) -> Option<&StateId> {
        self.selection.selected()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientSummaryView {
    pub client_id: ClientId,
    pub confirmed: bool,
    pub sessions: ReconciledList<SessionId>,
    /// Rebuilt from scratch whenever the session set is replaced.
    pub session_info: BTreeMap<SessionId, SessionDetail>,
    pub addresses: Vec<String>,
    pub opens: StateList,
    pub delegations: StateList,
    pub layouts: StateList,
}

impl ClientSummaryView {
    pub fn states(&self, kind: StateKind) -> &StateList {
        match kind {
            StateKind::Open => &self.opens,
            StateKind::Delegation => &self.delegations,
            StateKind::Layout => &self.layouts,
        }
    }

    fn states_mut(&mut self, kind: StateKind) -> &mut StateList {
        match kind {
            StateKind::Open => &mut self.opens,
            StateKind::Delegation => &mut self.delegations,
            StateKind::Layout => &mut self.layouts,
        }
    }

    /// Every known channel address, space separated.
    pub fn channels(&self) -> String {
        self.addresses.join(" ")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientSummaryCommand {
    SelectState(StateKind, StateId),
}

/// Detail feed for one client. A new monitor is built for every selection
/// target; it never changes client.
#[derive(Debug)]
pub struct ClientSummaryMonitor {
    client_id: ClientId,
}

impl ClientSummaryMonitor {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id }
    }
}

impl Monitor for ClientSummaryMonitor {
    type Payload = ClientDetail;
    type View = ClientSummaryView;
    type Command = ClientSummaryCommand;

    fn name(&self) -> &'static str {
        "client_summary"
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Client(self.client_id.clone())
    }

    fn initial_view(&self) -> ClientSummaryView {
        ClientSummaryView {
            client_id: self.client_id.clone(),
            confirmed: true,
            sessions: ReconciledList::new(),
            session_info: BTreeMap::new(),
            addresses: Vec::new(),
            opens: StateList::default(),
            delegations: StateList::default(),
            layouts: StateList::default(),
        }
    }

    fn apply(&mut self, view: &mut ClientSummaryView, payload: ClientDetail) -> Applied {
        let mut changed = false;
        if view.confirmed != payload.confirmed {
            view.confirmed = payload.confirmed;
            changed = true;
        }

        let sessions = view.sessions.reconcile_sorted(payload.sessions);
        changed |= view.opens.apply(payload.opens);
        changed |= view.delegations.apply(payload.delegations);
        changed |= view.layouts.apply(payload.layouts);

        if !sessions.changed() {
            return Applied::changed(changed);
        }

        view.session_info.clear();
        view.addresses.clear();
        let follow_ups = view
            .sessions
            .iter()
            .map(|id| Endpoint::Session(id.clone()))
            .collect();
        Applied::changed(true).with_follow_ups(follow_ups)
    }

    fn command(&mut self, view: &mut ClientSummaryView, command: ClientSummaryCommand) -> bool {
        match command {
            ClientSummaryCommand::SelectState(kind, id) => {
                let states = view.states_mut(kind);
                states.selection.select(&id, states.ids.items())
            }
        }
    }

    fn apply_follow_up(
        &mut self,
        view: &mut ClientSummaryView,
        endpoint: &Endpoint,
        payload: Value,
    ) -> Result<bool, FetchError> {
        let Endpoint::Session(session_id) = endpoint else {
            return Ok(false);
        };
        if !view.sessions.items().contains(session_id) {
            return Ok(false);
        }
        let detail: SessionDetail = decode_payload(endpoint, payload)?;
        view.session_info.insert(session_id.clone(), detail);
        view.addresses = aggregate_addresses(view.session_info.values());
        Ok(true)
    }
}
