use criterion::{criterion_group, criterion_main, Criterion};
use food_screen_core::{
    column_name, encode, DecisionTree, EncodedVector, FeatureSchema, InferenceEngine,
    LabelDecoder, LeafNode, RandomForest, SampleField, SampleRecord, SplitNode, TreeNode,
};

fn bench_schema() -> FeatureSchema {
    let columns = SampleField::ALL
        .into_iter()
        .flat_map(|field| {
            field.default_choices().iter().map(move |choice| column_name(field, choice))
        })
        .collect::<Vec<_>>();
    match FeatureSchema::new(columns) {
        Ok(schema) => schema,
        Err(err) => panic!("bench schema should build: {err}"),
    }
}

fn bench_record(index: usize) -> SampleRecord {
    let pick = |field: SampleField| {
        let choices = field.default_choices();
        choices[index % choices.len()].to_string()
    };
    SampleRecord {
        food_item: pick(SampleField::FoodItem),
        source_type: pick(SampleField::SourceType),
        storage_type: pick(SampleField::StorageType),
        color: pick(SampleField::Color),
        smell: pick(SampleField::Smell),
        texture: pick(SampleField::Texture),
        foreign_particles: pick(SampleField::ForeignParticles),
        appearance: pick(SampleField::Appearance),
        float_or_settle_test: pick(SampleField::FloatOrSettleTest),
        dissolves_in_water: pick(SampleField::DissolvesInWater),
        foam_after_mixing: pick(SampleField::FoamAfterMixing),
        burn_test_result: pick(SampleField::BurnTestResult),
        taste: pick(SampleField::Taste),
    }
}

/// Stump forest: tree `t` splits on column `t` and votes for `t % n_classes`.
fn bench_forest(n_features: usize, n_classes: usize) -> RandomForest {
    let trees = (0..100)
        .map(|tree_index| DecisionTree {
            n_features,
            n_classes,
            nodes: vec![
                TreeNode::Split(SplitNode {
                    feature: tree_index % n_features,
                    threshold: 0.5,
                    left: 1,
                    right: 2,
                }),
                TreeNode::Leaf(LeafNode { class_index: 0 }),
                TreeNode::Leaf(LeafNode { class_index: tree_index % n_classes }),
            ],
        })
        .collect();
    RandomForest { n_features, n_classes, trees }
}

fn decoder(labels: &[&str]) -> LabelDecoder {
    match LabelDecoder::new(labels.iter().map(ToString::to_string).collect()) {
        Ok(decoder) => decoder,
        Err(err) => panic!("bench decoder should build: {err}"),
    }
}

fn bench_encode(c: &mut Criterion) {
    let schema = bench_schema();
    let records = (0..64).map(bench_record).collect::<Vec<_>>();

    c.bench_function("encode_64_samples", |b| {
        b.iter(|| {
            let vectors = records.iter().map(|record| encode(record, &schema)).collect::<Vec<_>>();
            std::hint::black_box(vectors);
        });
    });
}

fn bench_infer(c: &mut Criterion) {
    let schema = bench_schema();
    let adulteration = bench_forest(schema.len(), 2);
    let risk = bench_forest(schema.len(), 4);
    let adulteration_decoder = decoder(&["No", "Yes"]);
    let risk_decoder = decoder(&["Low Risk", "Moderate", "Safe", "Toxic"]);
    let engine = InferenceEngine::new(&adulteration, &adulteration_decoder, &risk, &risk_decoder);
    let vectors: Vec<EncodedVector> =
        (0..64).map(|index| encode(&bench_record(index), &schema)).collect();

    c.bench_function("infer_64_samples_100_tree_forests", |b| {
        b.iter(|| {
            for vector in &vectors {
                if let Err(err) = engine.infer(vector) {
                    panic!("bench inference should succeed: {err}");
                }
            }
        });
    });
}

criterion_group!(benches, bench_encode, bench_infer);
criterion_main!(benches);
