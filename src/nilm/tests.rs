use approx::assert_abs_diff_eq;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::error::FhmmError;
use crate::hmm::{ApplianceHmm, DuplicateMeanPolicy, HmmFitter};
use crate::nilm::{
    ApplianceId, ChunkDisaggregation, ExclusionReason, Fhmm, FhmmConfig, PowerChunk,
    TrainingSeries,
};

fn two_state(prior: [f64; 2], stay: [f64; 2], means: [f64; 2]) -> ApplianceHmm {
    ApplianceHmm::from_vecs(
        prior.to_vec(),
        vec![vec![stay[0], 1.0 - stay[0]], vec![1.0 - stay[1], stay[1]]],
        means.to_vec(),
        vec![1.0, 1.0],
    )
    .unwrap()
}

fn small_config() -> FhmmConfig {
    FhmmConfig::new().with_min_chunk_length(3)
}

fn trained_pair() -> Fhmm {
    let mut fhmm = Fhmm::new(small_config());
    fhmm.train_from_models(vec![
        ("fridge".into(), two_state([0.5, 0.5], [0.9, 0.9], [10.0, 100.0])),
        ("lamp".into(), two_state([0.5, 0.5], [0.9, 0.9], [5.0, 50.0])),
    ])
    .unwrap();
    fhmm
}

#[test]
fn test_concrete_two_appliance_joint_means() {
    let fhmm = trained_pair();
    let joint = fhmm.joint().unwrap();
    assert_eq!(joint.num_states(), 4);
    assert_eq!(joint.means().to_vec(), vec![15.0, 60.0, 105.0, 150.0]);
}

#[test]
fn test_unsorted_models_are_canonicalised() {
    let mut fhmm = Fhmm::new(small_config());
    fhmm.train_from_models(vec![
        ("fridge".into(), two_state([0.3, 0.7], [0.8, 0.9], [100.0, 10.0])),
        ("lamp".into(), two_state([0.5, 0.5], [0.9, 0.9], [5.0, 50.0])),
    ])
    .unwrap();
    let fridge = &fhmm.appliances()[0].model;
    assert_eq!(fridge.means().to_vec(), vec![10.0, 100.0]);
    assert_eq!(fridge.prior().to_vec(), vec![0.7, 0.3]);
    assert_abs_diff_eq!(fridge.transition()[[0, 0]], 0.9, epsilon = 1e-12);
    assert_eq!(
        fhmm.joint().unwrap().means().to_vec(),
        vec![15.0, 60.0, 105.0, 150.0]
    );
}

#[test]
fn test_disaggregate_chunk_splits_power() {
    let fhmm = trained_pair();
    let chunk = PowerChunk::new(
        vec![100, 160, 220, 280, 340],
        vec![15.0, 60.5, 149.0, 104.0, 15.5],
    )
    .unwrap();
    let out = fhmm.disaggregate_chunk(&chunk).unwrap();
    assert_eq!(out.len(), 5);
    assert_eq!(out.timestamps, chunk.timestamps);

    let fridge = out.appliance(&ApplianceId::new("fridge")).unwrap();
    let lamp = out.appliance(&ApplianceId::new("lamp")).unwrap();
    assert_eq!(fridge.states, vec![0, 0, 1, 1, 0]);
    assert_eq!(lamp.states, vec![0, 1, 1, 0, 0]);
    assert_eq!(fridge.power, vec![10.0, 10.0, 100.0, 100.0, 10.0]);
    assert_eq!(out.total_power(), vec![15.0, 60.0, 150.0, 105.0, 15.0]);
}

#[test]
fn test_missing_readings_are_dropped() {
    let fhmm = trained_pair();
    let chunk = PowerChunk::new(vec![0, 1, 2, 3], vec![15.0, f64::NAN, 60.0, 60.0]).unwrap();
    let out = fhmm.disaggregate_chunk(&chunk).unwrap();
    assert_eq!(out.timestamps, vec![0, 2, 3]);
    assert_eq!(out.appliances[1].1.len(), 3);
}

#[test]
fn test_short_chunk_rejected() {
    let fhmm = trained_pair();
    let chunk = PowerChunk::from_readings(vec![15.0, 15.0]);
    assert_eq!(
        fhmm.disaggregate_chunk(&chunk).unwrap_err(),
        FhmmError::InsufficientChunkLength {
            required: 3,
            actual: 2
        }
    );
}

#[test]
fn test_minimum_chunk_policy_in_run() {
    let fhmm = trained_pair();
    let chunks = vec![
        PowerChunk::from_readings(vec![15.0; 2]),
        PowerChunk::from_readings(vec![15.0; 3]),
        PowerChunk::from_readings(vec![60.0; 7]),
        PowerChunk::from_readings(vec![]),
    ];
    let mut sink: Vec<ChunkDisaggregation> = Vec::new();
    let summary = fhmm.disaggregate(chunks, &mut sink).unwrap();
    assert_eq!(summary.decoded_chunks, 2);
    assert_eq!(summary.skipped_chunks, 2);
    assert_eq!(summary.rows, 10);
    assert_eq!(sink.len(), 2);
    assert_eq!(sink[0].len(), 3);
    assert_eq!(sink[1].len(), 7);
}

#[test]
fn test_decode_divergence_stops_run() {
    let fhmm = trained_pair();
    let chunks = vec![
        PowerChunk::from_readings(vec![15.0, 60.0, 150.0]),
        PowerChunk::from_readings(vec![15.0, 1e200, 60.0]),
        PowerChunk::from_readings(vec![60.0; 3]),
    ];
    let mut sink: Vec<ChunkDisaggregation> = Vec::new();
    let err = fhmm.disaggregate(chunks.clone(), &mut sink).unwrap_err();
    assert_eq!(err, FhmmError::DecodeDivergence { step: 1 });
    assert_eq!(sink.len(), 1);

    assert_eq!(
        fhmm.disaggregate_parallel(&chunks).unwrap_err(),
        FhmmError::DecodeDivergence { step: 1 }
    );
}

#[test]
fn test_parallel_matches_sequential() {
    let fhmm = trained_pair();
    let chunks = vec![
        PowerChunk::from_readings(vec![15.0, 60.0, 60.0, 150.0]),
        PowerChunk::from_readings(vec![15.0]),
        PowerChunk::from_readings(vec![105.0, 105.0, 15.0, 15.0, 60.0]),
    ];
    let parallel = fhmm.disaggregate_parallel(&chunks).unwrap();
    assert_eq!(parallel.len(), 3);
    assert!(parallel[1].is_none());

    let mut sequential: Vec<ChunkDisaggregation> = Vec::new();
    fhmm.disaggregate(chunks.clone(), &mut sequential).unwrap();
    let decoded: Vec<ChunkDisaggregation> = parallel.into_iter().flatten().collect();
    assert_eq!(decoded, sequential);
}

#[test]
fn test_untrained_model() {
    let fhmm = Fhmm::default();
    assert!(!fhmm.is_trained());
    let chunk = PowerChunk::from_readings(vec![1.0; 200]);
    assert_eq!(fhmm.disaggregate_chunk(&chunk).unwrap_err(), FhmmError::NotTrained);
    assert_eq!(fhmm.decode(&[1.0]).unwrap_err(), FhmmError::NotTrained);
    assert!(fhmm.disaggregate_parallel(&[chunk]).is_err());
}

#[test]
fn test_duplicate_appliance_rejected() {
    let mut fhmm = Fhmm::new(small_config());
    let model = two_state([0.5, 0.5], [0.9, 0.9], [10.0, 100.0]);
    let err = fhmm
        .train_from_models(vec![("fridge".into(), model.clone()), ("fridge".into(), model)])
        .unwrap_err();
    assert_eq!(
        err,
        FhmmError::DuplicateAppliance {
            id: "fridge".to_string()
        }
    );
}

#[test]
fn test_duplicate_means_policy_reject() {
    let mut fhmm = Fhmm::new(small_config().with_duplicate_means(DuplicateMeanPolicy::Reject));
    let err = fhmm
        .train_from_models(vec![(
            "heater".into(),
            two_state([0.5, 0.5], [0.9, 0.9], [40.0, 40.0]),
        )])
        .unwrap_err();
    assert_eq!(err, FhmmError::DuplicateMeans { value: 40.0 });
    assert!(!fhmm.is_trained());
}

#[test]
fn test_round_power() {
    let mut fhmm = Fhmm::new(small_config().with_round_power(true));
    fhmm.train_from_models(vec![(
        "tv".into(),
        two_state([0.5, 0.5], [0.9, 0.9], [0.4, 80.6]),
    )])
    .unwrap();
    let out = fhmm
        .disaggregate_chunk(&PowerChunk::from_readings(vec![0.5, 80.0, 81.0]))
        .unwrap();
    assert_eq!(out.appliances[0].1.power, vec![0.0, 81.0, 81.0]);
}

#[test]
fn test_repeated_builds_and_decodes_agree() {
    let a = trained_pair();
    let b = trained_pair();
    assert_eq!(a.joint().unwrap().prior(), b.joint().unwrap().prior());
    assert_eq!(a.joint().unwrap().transition(), b.joint().unwrap().transition());
    assert_eq!(a.joint().unwrap().means(), b.joint().unwrap().means());

    let readings: Vec<f64> = (0..50).map(|i| [15.0, 60.0, 150.0][i % 3] + 0.3).collect();
    assert_eq!(a.decode(&readings).unwrap(), b.decode(&readings).unwrap());
}

#[test]
fn test_four_appliance_unmix_is_additive() {
    let three = ApplianceHmm::from_vecs(
        vec![0.6, 0.3, 0.1],
        vec![
            vec![0.8, 0.1, 0.1],
            vec![0.2, 0.7, 0.1],
            vec![0.1, 0.2, 0.7],
        ],
        vec![0.0, 300.0, 900.0],
        vec![1.0, 1.0, 1.0],
    )
    .unwrap();
    let mut fhmm = Fhmm::new(small_config());
    fhmm.train_from_models(vec![
        ("a".into(), two_state([0.5, 0.5], [0.9, 0.9], [1.0, 2.0])),
        ("b".into(), three),
        ("c".into(), two_state([0.5, 0.5], [0.9, 0.9], [0.0, 40.0])),
        ("d".into(), two_state([0.5, 0.5], [0.9, 0.9], [3.0, 5000.0])),
    ])
    .unwrap();
    let joint = fhmm.joint().unwrap();
    assert_eq!(joint.num_states(), 24);

    let path: Vec<usize> = (0..joint.num_states()).collect();
    let traces = crate::hmm::unmix(&path, joint.state_counts(), joint.factor_means()).unwrap();
    for s in 0..joint.num_states() {
        let digits: Vec<usize> = traces.iter().map(|tr| tr.states[s]).collect();
        assert_eq!(joint.radix().encode(&digits).unwrap(), s);
        let total: f64 = traces.iter().map(|tr| tr.power[s]).sum();
        assert_abs_diff_eq!(joint.means()[s], total, epsilon = 1e-9);
    }
    for row in joint.transition().rows() {
        assert_abs_diff_eq!(row.sum(), 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_state_posteriors_shape() {
    let fhmm = trained_pair();
    let chunk = PowerChunk::from_readings(vec![15.0, f64::NAN, 60.0, 150.0]);
    let post = fhmm.state_posteriors(&chunk).unwrap();
    assert_eq!(post.probabilities.dim(), (3, 4));
    assert_eq!(post.argmax(), vec![0, 1, 3]);
}

fn agreement(decoded: &[usize], truth: &[usize]) -> f64 {
    decoded.iter().zip(truth).filter(|(a, b)| a == b).count() as f64 / truth.len() as f64
}

#[test]
fn test_train_end_to_end_on_synthetic_data() {
    let fridge = ApplianceHmm::from_vecs(
        vec![0.5, 0.5],
        vec![vec![0.97, 0.03], vec![0.05, 0.95]],
        vec![2.0, 120.0],
        vec![1.0, 4.0],
    )
    .unwrap();
    let kettle = ApplianceHmm::from_vecs(
        vec![0.9, 0.1],
        vec![vec![0.98, 0.02], vec![0.2, 0.8]],
        vec![0.0, 2000.0],
        vec![1.0, 9.0],
    )
    .unwrap();

    let mut rng = ChaCha8Rng::seed_from_u64(11);
    let (fridge_states, fridge_power) = fridge.sample(1500, &mut rng);
    let (kettle_states, kettle_power) = kettle.sample(1500, &mut rng);

    let config = FhmmConfig::new()
        .with_num_states("fridge", 2)
        .with_num_states("kettle", 2)
        .with_min_chunk_length(100);
    let mut fhmm = Fhmm::new(config);
    let report = fhmm
        .train(&[
            TrainingSeries::new("fridge", fridge_power.clone()),
            TrainingSeries::new("kettle", kettle_power.clone()),
        ])
        .unwrap();
    assert_eq!(
        report.trained,
        vec![ApplianceId::new("fridge"), ApplianceId::new("kettle")]
    );
    assert!(report.excluded.is_empty());

    let mains: Vec<f64> = fridge_power
        .iter()
        .zip(&kettle_power)
        .map(|(a, b)| a + b)
        .collect();
    let out = fhmm
        .disaggregate_chunk(&PowerChunk::from_readings(mains))
        .unwrap();
    assert_eq!(out.len(), 1500);

    let fridge_out = out.appliance(&ApplianceId::new("fridge")).unwrap();
    let kettle_out = out.appliance(&ApplianceId::new("kettle")).unwrap();
    assert!(agreement(&fridge_out.states, &fridge_states) > 0.95);
    assert!(agreement(&kettle_out.states, &kettle_states) > 0.95);
}

#[test]
fn test_training_exclusions_are_reported() {
    let config = FhmmConfig::new()
        .with_num_states("fridge", 2)
        .with_min_activation(0.05, 10.0);
    let mut fhmm = Fhmm::new(config);

    let fridge: Vec<f64> = (0..200)
        .map(|i| {
            let base = if i % 4 == 0 { 120.0 } else { 1.0 };
            base + (i % 3) as f64
        })
        .collect();
    let idle: Vec<f64> = vec![0.5; 200];
    let report = fhmm
        .train(&[
            TrainingSeries::new("fridge", fridge),
            TrainingSeries::new("idle", idle),
            TrainingSeries::with_chunks("empty", vec![]),
            TrainingSeries::new("tiny", vec![50.0, 60.0]),
        ])
        .unwrap();

    assert_eq!(report.trained, vec![ApplianceId::new("fridge")]);
    assert_eq!(report.excluded.len(), 3);
    assert!(matches!(
        report.excluded[0].reason,
        ExclusionReason::LowActivation { activation } if activation == 0.0
    ));
    assert_eq!(report.excluded[1].reason, ExclusionReason::NoData);
    assert!(matches!(
        report.excluded[2].reason,
        ExclusionReason::FitFailed(FhmmError::InsufficientTrainingData { .. })
    ));
    assert_eq!(fhmm.joint().unwrap().num_states(), 2);
}

#[test]
fn test_training_with_nothing_usable_fails() {
    let mut fhmm = Fhmm::new(small_config());
    let err = fhmm
        .train(&[TrainingSeries::with_chunks("empty", vec![])])
        .unwrap_err();
    assert_eq!(err, FhmmError::EmptyModel);
}

struct FixedFitter(ApplianceHmm);

impl HmmFitter for FixedFitter {
    fn fit(&self, _: &[f64], _: usize, _: u64) -> crate::error::Result<ApplianceHmm> {
        Ok(self.0.clone())
    }
}

#[test]
fn test_custom_fitter_and_multi_chunk_training() {
    let fitter = FixedFitter(two_state([0.5, 0.5], [0.9, 0.9], [100.0, 10.0]));
    let mut fhmm = Fhmm::new(small_config());
    let report = fhmm
        .train_with(
            &[TrainingSeries::with_chunks(
                "pump",
                vec![vec![10.0, 100.0], vec![5.0]],
            )],
            &fitter,
        )
        .unwrap();
    assert_eq!(report.trained.len(), 1);
    assert_eq!(fhmm.appliances()[0].model.means().to_vec(), vec![10.0, 100.0]);
}

#[test]
fn test_tied_means_exclude_only_that_appliance() {
    let config = FhmmConfig::new()
        .with_num_states("fridge", 2)
        .with_num_states("dead", 2)
        .with_duplicate_means(DuplicateMeanPolicy::Reject);
    let mut fhmm = Fhmm::new(config);

    let fridge: Vec<f64> = (0..200)
        .map(|i| {
            let base = if i % 4 == 0 { 120.0 } else { 1.0 };
            base + (i % 3) as f64
        })
        .collect();
    let report = fhmm
        .train(&[
            TrainingSeries::new("fridge", fridge),
            TrainingSeries::new("dead", vec![0.0; 200]),
        ])
        .unwrap();

    assert_eq!(report.trained, vec![ApplianceId::new("fridge")]);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].id, ApplianceId::new("dead"));
    assert!(matches!(
        report.excluded[0].reason,
        ExclusionReason::FitFailed(FhmmError::DuplicateMeans { .. })
    ));
    assert!(fhmm.is_trained());
    assert_eq!(fhmm.joint().unwrap().num_states(), 2);
}

#[test]
fn test_activation_threshold_is_exclusive() {
    let fitter = FixedFitter(two_state([0.5, 0.5], [0.9, 0.9], [1.0, 100.0]));
    let mut fhmm = Fhmm::new(small_config().with_min_activation(0.25, 10.0));
    let report = fhmm
        .train_with(
            &[
                TrainingSeries::new("pump", vec![100.0, 1.0, 1.0, 1.0]),
                TrainingSeries::new("fan", vec![100.0, 100.0, 1.0, 1.0]),
            ],
            &fitter,
        )
        .unwrap();
    assert_eq!(report.trained, vec![ApplianceId::new("fan")]);
    assert_eq!(
        report.excluded[0].reason,
        ExclusionReason::LowActivation { activation: 0.25 }
    );

    // a zero minimum disables the filter, even for an appliance that never turns on
    let mut fhmm = Fhmm::new(small_config());
    let report = fhmm
        .train_with(&[TrainingSeries::new("idle", vec![0.0; 4])], &fitter)
        .unwrap();
    assert_eq!(report.trained, vec![ApplianceId::new("idle")]);
}
