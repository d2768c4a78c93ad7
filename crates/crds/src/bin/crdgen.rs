//! Prints the CRD manifests as a multi-document YAML stream.

use anyhow::Result;
use crds::{BackupInfrastructure, ClusterInfrastructure};
use kube::CustomResourceExt;

fn main() -> Result<()> {
    let manifests = [
        serde_yaml::to_string(&ClusterInfrastructure::crd())?,
        serde_yaml::to_string(&BackupInfrastructure::crd())?,
    ];
    for manifest in manifests {
        println!("---");
        print!("{manifest}");
    }
    Ok(())
}
