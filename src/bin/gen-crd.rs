use chart_operator::crd::ChartDeployment;
use kube::CustomResourceExt;

/// Print the ChartDeployment CRD as YAML for installation manifests.
///
/// Use: cargo run --bin gen-crd > chartdeployments.yaml
fn main() -> anyhow::Result<()> {
    let crd = ChartDeployment::crd();
    print!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
