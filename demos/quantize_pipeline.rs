use quench::{
    dynamic_range_quantize, evaluate_model, float_quantize, full_integer_quantize,
    gzipped_model_size, Activation, Model, QuenchResult, Runtime, Shape, Tensor,
};

fn main() -> QuenchResult<()> {
    quench::init()?;
    println!("Quench quantization pipeline");

    // Stand-in for a trained classifier: 16 features, 4 classes.
    let model = Model::new(16)
        .add_random_dense(32, Activation::Relu)
        .add_random_dense(4, Activation::Softmax);

    let rt = Runtime::new()?;

    let representative: Vec<Tensor<2>> = (0..32)
        .map(|i| {
            let data: Vec<f32> = (0..16).map(|j| ((i * 16 + j) as f32 * 0.37).sin()).collect();
            Tensor::from_vec(data, Shape::new([1, 16]))
        })
        .collect::<QuenchResult<_>>()?;

    let dynamic = dynamic_range_quantize(&rt, &model)?;
    let full = full_integer_quantize(&rt, representative.clone(), &model)?;
    let f16 = float_quantize(&rt, &model)?;

    println!("dynamic-range buffer: {} bytes", dynamic.len());
    println!("full-integer buffer:  {} bytes", full.len());
    println!("float16 buffer:       {} bytes", f16.len());

    for (name, converted) in [("dynamic", &dynamic), ("full-int", &full), ("float16", &f16)] {
        let gzipped = gzipped_model_size(converted.as_bytes())?;
        println!("{:>8} gzipped: {} bytes", name, gzipped);
    }

    // Reuse the representative samples as a toy labeled test set.
    let y_test: Vec<usize> = (0..representative.len()).map(|i| i % 4).collect();
    let accuracy = evaluate_model(dynamic.as_bytes(), &representative, &y_test)?;
    println!("dynamic-range accuracy on toy set: {:.3}", accuracy);

    Ok(())
}
