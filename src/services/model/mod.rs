// Voice model lifecycle: provisioning, loading, shared access

pub mod bundle;
pub mod manager;
pub mod provisioner;

pub use bundle::{rebase_linked_paths, BundleLayout, ModelBundle, ModelDescriptor};
pub use manager::{ModelHandle, ModelLoader, ModelManager};
pub use provisioner::{ArchiveSource, ModelProvisioner};
