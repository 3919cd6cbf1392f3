use anyhow::Result;
use candle_core::{Device, Tensor};
use protangle_geometry::frames::{frames_are_orthonormal, points_tensor};
use protangle_geometry::psea::assign_chain;
use protangle_geometry::{
    backbone_dihedrals, build_backbone, orientation, BackboneGeometry, SecondaryStructure,
};

fn angle_difference(a: f32, b: f32) -> f32 {
    let two_pi = 2.0 * std::f32::consts::PI;
    ((a - b + std::f32::consts::PI).rem_euclid(two_pi) - std::f32::consts::PI).abs()
}

fn backbone_tensor(backbone: &[[[f32; 3]; 3]], device: &Device) -> Result<Tensor> {
    let flat: Vec<f32> = backbone.iter().flatten().flatten().copied().collect();
    Ok(Tensor::from_vec(flat, (backbone.len(), 3, 3), device)?)
}

fn alpha_helix(n: usize) -> Vec<[f32; 3]> {
    vec![
        [
            (-57f32).to_radians(),
            (-47f32).to_radians(),
            180f32.to_radians()
        ];
        n
    ]
}

#[test]
fn test_torsions_survive_reconstruction() -> Result<()> {
    let device = Device::Cpu;
    let torsions: Vec<[f32; 3]> = (0..12)
        .map(|i| {
            let t = i as f32 * 0.45;
            [-1.2 + 0.3 * t.sin(), 2.1 - 0.4 * t.cos(), 3.1 - 0.05 * t.sin()]
        })
        .collect();

    let backbone = build_backbone(&torsions, &BackboneGeometry::default());
    let recovered: Vec<Vec<f32>> =
        backbone_dihedrals(&backbone_tensor(&backbone, &device)?)?.to_vec2()?;
    assert_eq!(recovered.len(), torsions.len());

    for (i, (expected, found)) in torsions.iter().zip(recovered.iter()).enumerate() {
        if i > 0 {
            assert!(angle_difference(expected[0], found[0]) < 1e-3, "phi {i}");
        }
        if i + 1 < torsions.len() {
            assert!(angle_difference(expected[1], found[1]) < 1e-3, "psi {i}");
            assert!(angle_difference(expected[2], found[2]) < 1e-3, "omega {i}");
        }
    }
    assert_eq!(recovered[0][0], 0.0);
    assert_eq!(recovered[11][1..], [0.0, 0.0]);
    Ok(())
}

#[test]
fn test_helix_trace_is_helical() -> Result<()> {
    let device = Device::Cpu;
    let backbone = build_backbone(&alpha_helix(16), &BackboneGeometry::default());
    let ca: Vec<[f32; 3]> = backbone.iter().map(|[_, ca, _]| *ca).collect();

    let labels = assign_chain(&ca);
    assert!(labels[..12]
        .iter()
        .all(|label| *label == SecondaryStructure::Helix));

    let frames = orientation(&points_tensor(&ca, &device)?)?;
    assert_eq!(frames.dims(), &[16, 3, 3]);
    assert!(frames_are_orthonormal(&frames, 1e-4)?);
    Ok(())
}
