//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions the deployer writes, as one
//! multi-document YAML stream.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/bkapp.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use cnative_deployer::crd::{BkApp, DomainGroupMapping};
use kube::core::CustomResourceExt;

fn main() {
    for crd in [BkApp::crd(), DomainGroupMapping::crd()] {
        match serde_yaml::to_string(&crd) {
            Ok(yaml) => {
                println!("---");
                print!("{yaml}");
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {e}");
                std::process::exit(1);
            }
        }
    }
}
