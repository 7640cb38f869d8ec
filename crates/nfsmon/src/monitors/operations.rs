use crate::scheduler::{Applied, Monitor};
use crate::source::Endpoint;
use nfsmon_core::{OperationCount, OperationCounters, ProtocolFamily, ReconciledList};
use std::convert::Infallible;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OperationsView {
    pub operations: ReconciledList<OperationCount>,
}

/// Per-operation call counters for one protocol family.
#[derive(Debug)]
pub struct OperationsMonitor {
    family: ProtocolFamily,
}

impl OperationsMonitor {
    pub fn new(family: ProtocolFamily) -> Self {
        Self { family }
    }
}

impl Monitor for OperationsMonitor {
    type Payload = OperationCounters;
    type View = OperationsView;
    type Command = Infallible;

    fn name(&self) -> &'static str {
        match self.family {
            ProtocolFamily::Nfs4 => "operations_nfs4",
            ProtocolFamily::Nfs3 => "operations_nfs3",
        }
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Operations(self.family)
    }

    fn initial_view(&self) -> OperationsView {
        OperationsView::default()
    }

    fn apply(&mut self, view: &mut OperationsView, payload: OperationCounters) -> Applied {
        Applied::changed(view.operations.reconcile_keyed(payload.into_sorted()).changed())
    }

    fn command(&mut self, _view: &mut OperationsView, command: Infallible) -> bool {
        match command {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn counters(value: serde_json::Value) -> OperationCounters {
        serde_json::from_value(value).expect("parse counters")
    }

    #[test]
    fn rows_are_sorted_and_patched_by_name() {
        let mut monitor = OperationsMonitor::new(ProtocolFamily::Nfs4);
        let mut view = monitor.initial_view();

        monitor.apply(
            &mut view,
            counters(json!({"operations": {"WRITE": 1, "READ": 2, "ACCESS": 0}})),
        );
        let names: Vec<&str> = view.operations.iter().map(|row| row.name.as_str()).collect();
        assert_eq!(names, vec!["ACCESS", "READ", "WRITE"]);
        let generation = view.operations.generation();

        let applied = monitor.apply(
            &mut view,
            counters(json!({"operations": {"WRITE": 9, "READ": 2, "ACCESS": 0}})),
        );
        assert!(applied.changed);
        assert_eq!(view.operations.generation(), generation);
        assert_eq!(view.operations.items()[2].count, 9);
    }

    #[test]
    fn new_operation_replaces_rows() {
        let mut monitor = OperationsMonitor::new(ProtocolFamily::Nfs3);
        let mut view = monitor.initial_view();
        assert_eq!(monitor.endpoint().to_string(), "/nfs3");

        monitor.apply(&mut view, counters(json!({"operations": {"READ": 1}})));
        let generation = view.operations.generation();
        monitor.apply(
            &mut view,
            counters(json!({"operations": {"READ": 1, "GETATTR": 3}})),
        );
        assert_eq!(view.operations.generation(), generation + 1);
        assert!(!monitor
            .apply(
                &mut view,
                counters(json!({"operations": {"GETATTR": 3, "READ": 1}}))
            )
            .changed);
    }
}
