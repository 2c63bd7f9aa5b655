use candle_core::{Device, Tensor};
use batchrag_embed::l2_normalize_rows;

#[test]
fn l2_normalize_rows_basic() {
    let dev = Device::Cpu;
    let t = Tensor::from_slice(&[3.0f32, 4.0, 0.0, 0.0,
                                 1.0, 2.0, 3.0, 4.0],
                               (2, 4), &dev).unwrap();
    let out = l2_normalize_rows(&t).unwrap();
    let v: Vec<Vec<f32>> = out.to_vec2().unwrap();
    let expected0 = [0.6f32, 0.8, 0.0, 0.0];
    for (a, b) in v[0].iter().cloned().zip(expected0) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
    let norm: f32 = (1.0f32 + 4.0 + 9.0 + 16.0).sqrt();
    for (a, b) in v[1].iter().cloned().zip([1.0 / norm, 2.0 / norm, 3.0 / norm, 4.0 / norm]) {
        assert!((a - b).abs() < 1e-5, "a={} b={}", a, b);
    }
}

#[test]
fn l2_normalize_rows_rejects_3d() {
    let t = Tensor::zeros((1, 2, 3), candle_core::DType::F32, &Device::Cpu).unwrap();
    assert!(l2_normalize_rows(&t).is_err());
}
