use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use ndarray::{Array2, Array3, Array4, ArrayD};
use ocrkit::{
    full_text, DetConfig, Dictionary, EngineError, InferenceEngine, LayoutConfig, LayoutDetector, LayoutReport,
    LayoutVariant, Mat, OcrEngine, OcrReport, RecConfig, TextDetector, TextRecognizer,
};

type Respond = Box<dyn Fn(&[(String, ArrayD<f32>)]) -> ArrayD<f32> + Send + Sync>;

struct MockEngine {
    names: Vec<String>,
    calls: Arc<AtomicUsize>,
    respond: Respond,
}

impl MockEngine {
    fn new(names: &[&str], respond: impl Fn(&[(String, ArrayD<f32>)]) -> ArrayD<f32> + Send + Sync + 'static) -> Self {
        Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            calls: Arc::new(AtomicUsize::new(0)),
            respond: Box::new(respond),
        }
    }
}

impl InferenceEngine for MockEngine {
    fn input_names(&self) -> &[String] {
        &self.names
    }

    fn run(&self, inputs: Vec<(String, ArrayD<f32>)>) -> Result<ArrayD<f32>, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok((self.respond)(&inputs))
    }
}

fn layout_rows() -> ArrayD<f32> {
    Array2::from_shape_vec(
        (3, 6),
        vec![
            11.0, 0.93, 64.0, 32.0, 576.0, 96.0, // doc_title
            2.0, 0.81, 64.0, 128.0, 576.0, 600.0, // text
            5.0, 0.20, 0.0, 0.0, 10.0, 10.0, // below threshold
        ],
    )
    .map(|a| a.into_dyn())
    .unwrap_or_else(|_| ArrayD::zeros(vec![0, 6]))
}

#[test]
fn layout_m_model_maps_boxes_to_original_image() {
    let engine = MockEngine::new(&["image", "scale_factor"], |_| layout_rows());
    let detector = LayoutDetector::new(engine, LayoutConfig::default());
    assert_eq!(detector.variant(), LayoutVariant::M);

    // 1280x320 image: scale factor (0.5, 2.0).
    let img = Mat::from_fn(1280, 320, |_, _| [240, 240, 240]);
    let detections = detector.detect(&img, 0.5).unwrap();

    assert_eq!(detections.len(), 2);
    assert_eq!(detections[0].class_name, "doc_title");
    assert!((detections[0].x1 - 128.0).abs() < 1e-3);
    assert!((detections[0].y1 - 16.0).abs() < 1e-3);
    assert!((detections[0].x2 - 1152.0).abs() < 1e-3);
    assert!((detections[0].y2 - 48.0).abs() < 1e-3);
    // y2 = 300 stays inside the 320 px image.
    assert!((detections[1].y2 - 300.0).abs() < 1e-3);

    let report = serde_json::to_value(LayoutReport::new(&detections, Default::default(), 1280, 320)).unwrap();
    assert_eq!(report["count"], 2);
    assert_eq!(report["detections"][1]["class_name"], "text");
    assert_eq!(report["detections"][0]["score"], 0.93);
}

#[test]
fn layout_l_model_keeps_raw_coordinates() {
    let engine = MockEngine::new(&["im_shape", "image", "scale_factor"], |_| layout_rows());
    let detector = LayoutDetector::new(engine, LayoutConfig::default());
    assert_eq!(detector.variant(), LayoutVariant::L);

    let img = Mat::from_fn(1280, 320, |_, _| [240, 240, 240]);
    let detections = detector.detect(&img, 0.5).unwrap();
    assert_eq!(detections.len(), 2);
    assert!((detections[0].x1 - 64.0).abs() < 1e-3);
    assert!((detections[0].y2 - 96.0).abs() < 1e-3);
    // Clamped to the image height.
    assert!((detections[1].y2 - 320.0).abs() < 1e-3);
}

/// Detection map with three text lines: two side by side on the first row and
/// one underneath.
fn detection_engine() -> MockEngine {
    MockEngine::new(&["x"], |inputs| {
        let shape = inputs[0].1.shape().to_vec();
        Array4::from_shape_fn((1, 1, shape[2], shape[3]), |(_, _, y, x)| {
            let first_left = (8..56).contains(&x) && (8..20).contains(&y);
            let first_right = (72..120).contains(&x) && (10..22).contains(&y);
            let second = (8..100).contains(&x) && (40..52).contains(&y);
            if first_left || first_right || second {
                0.9
            } else {
                0.05
            }
        })
        .into_dyn()
    })
}

/// Recognition model that reads the crop's mean red value: bright crops say
/// "hi", dark crops produce only blanks.
fn recognition_engine() -> MockEngine {
    MockEngine::new(&["x"], |inputs| {
        let input = &inputs[0].1;
        // BGR planes: red is the last one.
        let red = input.index_axis(ndarray::Axis(1), 2).mean().unwrap_or(-1.0);
        let mut out = Array3::<f32>::zeros((1, 4, 4));
        if red > 0.0 {
            out[[0, 0, 1]] = 0.9;
            out[[0, 0, 0]] = 0.1;
            out[[0, 1, 0]] = 1.0;
            out[[0, 2, 2]] = 0.7;
            out[[0, 2, 0]] = 0.3;
            out[[0, 3, 2]] = 1.0;
        } else {
            for t in 0..4 {
                out[[0, t, 0]] = 1.0;
            }
        }
        out.into_dyn()
    })
}

fn dictionary() -> Dictionary {
    Dictionary::parse("h\ni\n").unwrap()
}

#[test]
fn ocr_reads_lines_in_reading_order() {
    let det = TextDetector::new(detection_engine(), DetConfig::default());
    let rec_engine = recognition_engine();
    let rec_calls = rec_engine.calls.clone();
    let rec = TextRecognizer::new(rec_engine, dictionary(), RecConfig::default());
    let ocr = OcrEngine::new(det, rec);

    // Bright page, dark everywhere right of x = 64.
    let img = Mat::from_fn(128, 64, |x, _| if x < 64 { [250, 250, 250] } else { [10, 10, 10] });

    let polygons = ocr.detect_text(&img, 0.3).unwrap();
    assert_eq!(polygons.len(), 3);
    assert!(polygons[0].points[0].x < polygons[1].points[0].x);
    assert!(polygons[2].points[0].y > 30.0);
    for p in &polygons {
        for pt in &p.points {
            assert!(pt.x >= 0.0 && pt.x <= 128.0 && pt.y >= 0.0 && pt.y <= 64.0);
        }
    }

    let lines = ocr.recognize_text(&img, 0.3, 0.5).unwrap();
    assert_eq!(rec_calls.load(Ordering::SeqCst), 3);

    // The right-hand line is dark and decodes to nothing.
    assert_eq!(lines.len(), 2);
    assert_eq!(lines[0].text, "hi");
    assert!((lines[0].score - 0.8).abs() < 1e-5);
    assert!(lines[0].y1 < lines[1].y1);
    assert_eq!(full_text(&lines), "hi\nhi");

    let report = serde_json::to_value(OcrReport::new(&lines, Default::default(), 128, 64)).unwrap();
    assert_eq!(report["count"], 2);
    assert_eq!(report["results"][0]["text"], "hi");
    assert_eq!(report["results"][0]["score"], 0.8);

    let strict = ocr.recognize_text(&img, 0.3, 0.85).unwrap();
    assert!(strict.is_empty());
}

#[test]
fn blank_page_produces_no_lines_and_skips_recognition() {
    let det = TextDetector::new(
        MockEngine::new(&["x"], |inputs| {
            let shape = inputs[0].1.shape().to_vec();
            Array4::<f32>::zeros((1, 1, shape[2], shape[3])).into_dyn()
        }),
        DetConfig::default(),
    );
    let rec_engine = recognition_engine();
    let rec_calls = rec_engine.calls.clone();
    let ocr = OcrEngine::new(det, TextRecognizer::new(rec_engine, dictionary(), RecConfig::default()));

    let img = Mat::from_fn(200, 100, |_, _| [255, 255, 255]);
    assert!(ocr.recognize_text(&img, 0.3, 0.5).unwrap().is_empty());
    assert_eq!(rec_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn boxed_engines_can_be_mixed() {
    let det: Box<dyn InferenceEngine> = Box::new(detection_engine());
    let rec: Box<dyn InferenceEngine> = Box::new(recognition_engine());
    let ocr = OcrEngine::new(
        TextDetector::new(det, DetConfig::default()),
        TextRecognizer::new(rec, dictionary(), RecConfig::default()),
    );
    let img = Mat::from_fn(128, 64, |_, _| [250, 250, 250]);
    assert_eq!(ocr.recognize_text(&img, 0.3, 0.5).unwrap().len(), 3);
}

#[test]
fn sliver_image_reads_as_empty_page() {
    let det_engine = detection_engine();
    let det_calls = det_engine.calls.clone();
    let ocr = OcrEngine::new(
        TextDetector::new(det_engine, DetConfig::default()),
        TextRecognizer::new(recognition_engine(), dictionary(), RecConfig::default()),
    );

    let img = Mat::from_fn(1, 1000, |_, _| [250, 250, 250]);
    assert!(ocr.recognize_text(&img, 0.3, 0.5).unwrap().is_empty());
    assert_eq!(det_calls.load(Ordering::SeqCst), 0);
}
