use anyhow::Result;
use candle_core::DType;
use candle_nn::{VarBuilder, VarMap};
use clap::Parser;
use protangle_geometry::psea::assign_chain;
use protangle_geometry::{backbone_dihedrals, build_backbone, BackboneGeometry};
use protangle_model::{device, ProteinTransformer, ProteinTransformerConfig};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Run a randomly initialized torsion model on an ideal helix")]
struct Args {
    /// Run on CPU rather than on GPU.
    #[arg(long)]
    cpu: bool,

    /// Number of residues in the helix.
    #[arg(long, default_value_t = 24)]
    residues: usize,

    /// JSON model config; defaults to the small preset.
    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let device = device(args.cpu)?;
    let config = match &args.config {
        Some(path) => ProteinTransformerConfig::from_json_file(path)?,
        None => ProteinTransformerConfig::small(),
    };

    let torsions = vec![
        [
            (-57f32).to_radians(),
            (-47f32).to_radians(),
            180f32.to_radians()
        ];
        args.residues
    ];
    let backbone = build_backbone(&torsions, &BackboneGeometry::default());
    let ca: Vec<[f32; 3]> = backbone.iter().map(|[_, ca, _]| *ca).collect();
    let labels: String = assign_chain(&ca).iter().map(|s| s.to_string()).collect();
    println!("Secondary structure: {labels}");

    let flat: Vec<f32> = backbone.iter().flatten().flatten().copied().collect();
    let tertiary = candle_core::Tensor::from_vec(flat, (args.residues, 3, 3), &device)?;
    let angles = backbone_dihedrals(&tertiary)?;

    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
    let model = ProteinTransformer::new(&config, vb)?;
    let params = model.forward_from_structure(&angles, &tertiary, false)?;

    let log_prob = params.log_prob(&angles)?;
    println!("Mixture components: {}", params.mix()?);
    println!(
        "Mean log likelihood: {:.3}",
        log_prob.mean_all()?.to_scalar::<f32>()?
    );
    let best: Vec<Vec<f32>> = params.most_likely_angles()?.to_vec2()?;
    for (idx, [phi, psi, omega]) in best
        .iter()
        .map(|row| [row[0], row[1], row[2]])
        .enumerate()
        .take(5)
    {
        println!(
            "residue {idx:>3}: phi {:>7.1} psi {:>7.1} omega {:>7.1}",
            phi.to_degrees(),
            psi.to_degrees(),
            omega.to_degrees()
        );
    }
    Ok(())
}
