use std::sync::Arc;

use crate::build::{BuildContext, Phase};
use crate::resource::Resource;
use crate::site::Site;

pub type PhaseHook = Box<dyn Fn(&Site, &mut BuildContext) + Send + Sync>;

pub type ProcessedHook = Box<dyn Fn(&Site, &Arc<Resource>, &[Arc<Resource>]) + Send + Sync>;

/// Lifecycle callbacks, run synchronously in registration order on the
/// building thread. Panics propagate.
#[derive(Default)]
pub struct Hooks {
    start: Vec<(Phase, PhaseHook)>,
    end: Vec<(Phase, PhaseHook)>,
    processed: Vec<ProcessedHook>,
}

impl Hooks {
    pub fn on_phase_start(&mut self, phase: Phase, hook: PhaseHook) {
        self.start.push((phase, hook));
    }

    pub fn on_phase_end(&mut self, phase: Phase, hook: PhaseHook) {
        self.end.push((phase, hook));
    }

    pub fn on_resource_processed(&mut self, hook: ProcessedHook) {
        self.processed.push(hook);
    }

    pub(crate) fn phase_start(&self, site: &Site, ctx: &mut BuildContext) {
        let phase = ctx.phase;
        self.start.iter()
            .filter(|(p, _)| *p == phase)
            .for_each(|(_, hook)| hook(site, ctx));
    }

    pub(crate) fn phase_end(&self, site: &Site, ctx: &mut BuildContext) {
        let phase = ctx.phase;
        self.end.iter()
            .filter(|(p, _)| *p == phase)
            .for_each(|(_, hook)| hook(site, ctx));
    }

    pub(crate) fn resource_processed(&self, site: &Site, resource: &Arc<Resource>, targets: &[Arc<Resource>]) {
        self.processed.iter().for_each(|hook| hook(site, resource, targets));
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("start", &self.start.len())
            .field("end", &self.end.len())
            .field("processed", &self.processed.len())
            .finish()
    }
}
