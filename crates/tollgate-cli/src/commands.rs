//! CLI command definitions.

use clap::{Subcommand, ValueEnum};
use std::path::PathBuf;
use tollgate_core::events::EventKind;

#[derive(Subcommand)]
pub enum Commands {
    /// Show the branch rule governing a reference
    Resolve {
        /// YAML file holding the branch rules
        #[arg(short, long)]
        rules: PathBuf,

        /// Branch name or full git reference
        reference: String,
    },

    /// Decide whether a pipeline definition runs for an event
    Evaluate {
        /// Pipeline definition file
        definition: PathBuf,

        /// YAML file holding the branch rules
        #[arg(short, long)]
        rules: PathBuf,

        /// Reference the event targets
        #[arg(long = "ref")]
        reference: String,

        /// Event kind
        #[arg(short, long, value_enum, default_value_t = KindArg::Push)]
        kind: KindArg,
    },

    /// Print a definition with deploy action timeouts unbounded
    Rewrite {
        /// Pipeline definition file
        definition: PathBuf,

        /// Action types to rewrite (defaults to the configured deploy types)
        #[arg(long = "action-type")]
        action_types: Vec<String>,
    },

    /// Feed one event file through the trigger flow
    Trigger {
        /// Event file (YAML or JSON)
        event: PathBuf,

        /// Return once runs are dispatched instead of waiting for watchers
        #[arg(long)]
        no_wait: bool,
    },

    /// Show the effective configuration
    Config,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum KindArg {
    Push,
    Tag,
    Merge,
    Manual,
}

impl From<KindArg> for EventKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Push => EventKind::Push,
            KindArg::Tag => EventKind::Tag,
            KindArg::Merge => EventKind::MergeRequest,
            KindArg::Manual => EventKind::Manual,
        }
    }
}
