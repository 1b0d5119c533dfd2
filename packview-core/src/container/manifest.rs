use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FileEntry {
    pub path: String,
    pub u_size: u64,
    pub c_size: u64,
    pub codec: u8,
    /// Offset relative to the start of the data section.
    pub data_off: u64,
    pub blake3: [u8; 32],
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Meta {
    pub created: i64,
    pub tool: String,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct Manifest {
    pub files: Vec<FileEntry>,
    pub meta: Meta,
}
