use crate::scheduler::{Applied, Monitor};
use crate::source::Endpoint;
use nfsmon_core::{ClientId, ReconciledList, Reselect, Selection};

/// Connected clients, sorted by id, plus the operator's current pick.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientListView {
    pub clients: ReconciledList<ClientId>,
    pub selection: Selection<ClientId>,
}

impl ClientListView {
    pub fn selected(&self) -> Option<&ClientId> {
        self.selection.selected()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientListCommand {
    Select(ClientId),
}

#[derive(Debug, Default)]
pub struct ClientListMonitor;

impl Monitor for ClientListMonitor {
    type Payload = Vec<ClientId>;
    type View = ClientListView;
    type Command = ClientListCommand;

    fn name(&self) -> &'static str {
        "clients"
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Clients
    }

    fn initial_view(&self) -> ClientListView {
        ClientListView {
            clients: ReconciledList::new(),
            selection: Selection::new(Reselect::Immediate),
        }
    }

    fn apply(&mut self, view: &mut ClientListView, payload: Vec<ClientId>) -> Applied {
        let list_changed = view.clients.reconcile_sorted(payload).changed();
        let selection_changed = view.selection.reconcile(view.clients.items());
        Applied::changed(list_changed || selection_changed)
    }

    fn command(&mut self, view: &mut ClientListView, command: ClientListCommand) -> bool {
        match command {
            ClientListCommand::Select(id) => view.selection.select(&id, view.clients.items()),
        }
    }
}
