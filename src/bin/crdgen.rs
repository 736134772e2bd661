//! # CRD Generator
//!
//! Prints the `ConfigurationDistributionRule` CustomResourceDefinition as YAML.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin crdgen > config/crd/configurationdistributionrule.yaml
//!
//! # Generate and apply directly
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use config_distributor::crd::ConfigurationDistributionRule;
use kube::core::CustomResourceExt;

fn main() {
    let crd = ConfigurationDistributionRule::crd();

    match serde_yaml::to_string(&crd) {
        Ok(yaml) => {
            print!("{yaml}");
        }
        Err(e) => {
            eprintln!("Failed to serialize CRD to YAML: {e}");
            std::process::exit(1);
        }
    }
}
