//! Integration test: text augmentation transforms

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use stackwise::augment::{
    Augmentation, AugmentationConfig, AugmentedBatch, CropBound, RandomConcat, RandomCrop, RandomTranslation,
    TEXT_COLUMN,
};
use stackwise::frame::{FeatureFrame, LabelMatrix, LabelSchema};
use ndarray::array;

fn sentence(n: usize) -> String {
    (0..n).map(|i| format!("w{}", i)).collect::<Vec<_>>().join(" ")
}

fn batch(texts: Vec<String>) -> AugmentedBatch {
    let frame = FeatureFrame::with_row_count(texts.len())
        .with_text(TEXT_COLUMN, texts)
        .unwrap();
    AugmentedBatch::unlabeled(frame)
}

fn texts(batch: &AugmentedBatch) -> Vec<String> {
    batch.frame.text(TEXT_COLUMN).unwrap().to_vec()
}

#[test]
fn test_same_seed_same_output() {
    let transforms: Vec<Box<dyn Augmentation>> = vec![
        Box::new(RandomCrop::new(2usize, 6usize)),
        Box::new(RandomConcat::new(0.5)),
    ];
    let input: Vec<String> = (5..25).map(sentence).collect();

    let run = |seed: u64| {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut out = batch(input.clone());
        for t in &transforms {
            out = t.apply(out, &mut rng).unwrap();
        }
        texts(&out)
    };

    assert_eq!(run(11), run(11));
    assert_ne!(run(11), run(12));
}

#[test]
fn test_crop_is_contiguous_and_within_bounds() {
    let crop = RandomCrop::new(3usize, 5usize);
    let original = sentence(12);
    let tokens: Vec<&str> = original.split_whitespace().collect();
    let mut rng = ChaCha8Rng::seed_from_u64(3);

    for _ in 0..200 {
        let out = crop.crop_text(&original, 0, &mut rng).unwrap();
        let kept: Vec<&str> = out.split_whitespace().collect();
        assert!((3..=5).contains(&kept.len()), "{} tokens", kept.len());
        let start = tokens.iter().position(|t| *t == kept[0]).unwrap();
        assert_eq!(&tokens[start..start + kept.len()], kept.as_slice());
    }
}

#[test]
fn test_crop_longer_than_text_keeps_it() {
    let crop = RandomCrop::new(50usize, 200usize);
    let mut rng = ChaCha8Rng::seed_from_u64(0);
    assert_eq!(crop.crop_text("short text here", 0, &mut rng).unwrap(), "short text here");
}

#[test]
fn test_fractional_bounds() {
    let crop = RandomCrop::new(CropBound::Fraction(1.0), CropBound::Fraction(1.0));
    let mut rng = ChaCha8Rng::seed_from_u64(9);
    let input: Vec<String> = (1..10).map(sentence).collect();
    let out = crop.apply(batch(input.clone()), &mut rng).unwrap();
    assert_eq!(texts(&out), input);

    let half = RandomCrop::new(0.5, 0.5);
    let out = half.apply(batch(vec![sentence(10), sentence(3)]), &mut rng).unwrap();
    let lengths: Vec<usize> = texts(&out).iter().map(|t| t.split_whitespace().count()).collect();
    assert_eq!(lengths, vec![5, 2]);
}

#[test]
fn test_translation_reads_language_columns() {
    let frame = FeatureFrame::with_row_count(3)
        .with_text(TEXT_COLUMN, vec!["hello".into(), "world".into(), "again".into()])
        .unwrap()
        .with_text(format!("{}__de", TEXT_COLUMN), vec!["hallo".into(), "welt".into(), "nochmal".into()])
        .unwrap();
    let always = RandomTranslation::new(1.0).with_languages(vec!["de".to_string()]);
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    let out = always.apply(AugmentedBatch::unlabeled(frame.clone()), &mut rng).unwrap();
    assert_eq!(texts(&out), vec!["hallo", "welt", "nochmal"]);

    let never = RandomTranslation::new(0.0).with_languages(vec!["de".to_string()]);
    let out = never.apply(AugmentedBatch::unlabeled(frame.clone()), &mut rng).unwrap();
    assert_eq!(texts(&out), vec!["hello", "world", "again"]);

    // No French column
    let missing = RandomTranslation::new(0.5).with_languages(vec!["fr".to_string()]);
    assert!(missing.apply(AugmentedBatch::unlabeled(frame), &mut rng).is_err());
}

#[test]
fn test_concat_takes_label_maximum() {
    let frame = FeatureFrame::with_row_count(2)
        .with_text(TEXT_COLUMN, vec!["nice".into(), "rude".into()])
        .unwrap();
    let labels = LabelMatrix::new(
        LabelSchema::new(["toxic", "insult"]).unwrap(),
        array![[0.0, 0.0], [1.0, 0.0]],
    )
    .unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let out = RandomConcat::new(1.0)
        .apply(AugmentedBatch::new(frame, Some(labels)), &mut rng)
        .unwrap();

    // With two rows, each row's partner is the other one
    assert_eq!(texts(&out), vec!["nice rude", "rude nice"]);
    let labels = out.labels.unwrap();
    assert_eq!(labels.values(), &array![[1.0, 0.0], [1.0, 0.0]]);
}

#[test]
fn test_config_builds_equivalent_transform() {
    let config: AugmentationConfig = serde_json::from_str(
        r#"{"type": "crop", "min_len": {"tokens": 2}, "max_len": {"fraction": 0.5}}"#,
    )
    .unwrap();
    let built = config.build(TEXT_COLUMN);
    let direct = RandomCrop::new(2usize, 0.5);
    assert_eq!(built.describe(), direct.describe());

    let input = vec![sentence(20), sentence(8)];
    let a = built.apply(batch(input.clone()), &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
    let b = direct.apply(batch(input), &mut ChaCha8Rng::seed_from_u64(4)).unwrap();
    assert_eq!(texts(&a), texts(&b));
}
