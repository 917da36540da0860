use kube::core::CustomResourceExt;
use oam_autoscaler::crd::autoscaler::Autoscaler;

fn main() -> anyhow::Result<()> {
    let crd = Autoscaler::crd();
    println!("{}", serde_yaml::to_string(&crd)?);
    Ok(())
}
