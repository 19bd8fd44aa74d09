use crate::config::model::RuntimeConfig;
use crate::disk::dialect::VolumeManager;
use crate::types::RunMode;
use crate::util::command::Runner;
use crate::util::console::Console;

/// Everything a step needs to talk to the outside world.
pub struct Context<'a> {
    pub runner: &'a dyn Runner,
    pub console: &'a dyn Console,
    pub manager: &'a dyn VolumeManager,
    pub config: &'a RuntimeConfig,
    pub run_mode: RunMode,
}
