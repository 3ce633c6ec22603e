// crates/reputon-store/src/files.rs

use std::fmt;

/// The independently persisted records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StateFile {
    Cluster,
    ResourceOpinion,
    PortOpinion,
    Assignment,
    ExecutionCount,
}

impl StateFile {
    /// File name inside the data directory.
    pub fn file_name(&self) -> &'static str {
        match self {
            StateFile::Cluster => "cluster.json",
            StateFile::ResourceOpinion => "resource_opinion.json",
            StateFile::PortOpinion => "port_opinion.json",
            StateFile::Assignment => "port_eval_universe.json",
            StateFile::ExecutionCount => "execution_count.json",
        }
    }
}

impl fmt::Display for StateFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}
