use crate::scheduler::{Applied, Monitor};
use crate::source::Endpoint;
use nfsmon_core::{Device, FilesystemSnapshot, FsStats, HiddenSections, Replica, Section};
use std::convert::Infallible;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilesystemView {
    pub stats: FsStats,
    pub devices: Section<Device>,
    pub replicas: Section<Replica>,
}

#[derive(Debug, Default)]
pub struct FilesystemMonitor {
    hidden_sections: HiddenSections,
}

impl FilesystemMonitor {
    pub fn new(hidden_sections: HiddenSections) -> Self {
        Self { hidden_sections }
    }
}

impl Monitor for FilesystemMonitor {
    type Payload = FilesystemSnapshot;
    type View = FilesystemView;
    type Command = Infallible;

    fn name(&self) -> &'static str {
        "filesystem"
    }

    fn endpoint(&self) -> Endpoint {
        Endpoint::Filesystem
    }

    fn initial_view(&self) -> FilesystemView {
        FilesystemView::default()
    }

    fn apply(&mut self, view: &mut FilesystemView, payload: FilesystemSnapshot) -> Applied {
        let stats = view.stats.patch_from(payload.stats);
        let devices = view.devices.apply(payload.devices, self.hidden_sections);
        let replicas = view.replicas.apply(payload.replicas, self.hidden_sections);
        Applied::changed(stats || devices.changed() || replicas.changed())
    }

    fn command(&mut self, _view: &mut FilesystemView, command: Infallible) -> bool {
        match command {}
    }
}
