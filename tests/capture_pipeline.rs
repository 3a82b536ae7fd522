// 该文件是 Jianma （鉴码） 项目的一部分。
// tests/capture_pipeline.rs - 采集流水线集成测试
//
// 本文件根据 Apache 许可证第 2.0 版（以下简称“许可证”）授权使用；
// 除非遵守该许可证条款，否则您不得使用本文件。
// 您可通过以下网址获取许可证副本：
// http://www.apache.org/licenses/LICENSE-2.0
// 除非适用法律要求或书面同意，根据本许可协议分发的软件均按“原样”提供，
// 不附带任何形式的明示或暗示的保证或条件。
// 有关许可权限与限制的具体条款，请参阅本许可协议。
//
// Copyright (C) 2026 Johann Li <me@qinka.pro>, Wareless Group

use std::{
  cell::RefCell,
  collections::VecDeque,
  convert::Infallible,
  rc::Rc,
};

use jianma::{
  capture::{CaptureArtifacts, CaptureError, CaptureSession, CaptureState, FrameOutcome},
  config::{CaptureConfig, ExtractStrategy},
  detect::{PlainSymbol, SymbolDecoder},
  enhance::{ExternalEnhancer, ResizeEnhancer},
  frame::RgbaFrame,
  geometry::{BoundingBox, Point2D},
  input::ImageFileInput,
  output::Render,
  region::ExtractedRegion,
  task::{ContinuousTask, Task},
};

const TEXT: &str = "https://example.com/p/42";

/// 按顺序回放预先给定的检测结果
struct ScriptedDecoder {
  script: RefCell<VecDeque<Option<Vec<Point2D>>>>,
}

impl ScriptedDecoder {
  fn new(script: Vec<Option<Vec<Point2D>>>) -> Self {
    Self {
      script: RefCell::new(script.into()),
    }
  }
}

impl SymbolDecoder for ScriptedDecoder {
  type Symbol = PlainSymbol;
  type Error = Infallible;

  fn decode(&self, _pixels: &RgbaFrame) -> Result<Option<PlainSymbol>, Infallible> {
    Ok(
      self
        .script
        .borrow_mut()
        .pop_front()
        .flatten()
        .map(|points| PlainSymbol {
          text: TEXT.into(),
          points,
        }),
    )
  }
}

fn quad(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2D> {
  vec![
    Point2D::new(x0, y0),
    Point2D::new(x1, y0),
    Point2D::new(x1, y1),
    Point2D::new(x0, y1),
  ]
}

fn started(config: CaptureConfig, script: Vec<Option<Vec<Point2D>>>) -> CaptureSession<ScriptedDecoder> {
  let mut session = CaptureSession::new(config, ScriptedDecoder::new(script)).unwrap();
  session.start();
  session
}

fn immediate() -> CaptureConfig {
  CaptureConfig {
    stability_enabled: false,
    ..CaptureConfig::default()
  }
}

#[test]
fn padded_crop_and_center_patch_from_a_square_detection() {
  let mut frame = RgbaFrame::filled(1000, 1000, [255, 255, 255, 255]);
  frame.put_pixel(456, 456, [10, 20, 30, 255]);

  let mut session = started(immediate(), vec![Some(quad(400.0, 400.0, 600.0, 600.0))]);
  let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
    panic!("expected a committed capture");
  };
  assert_eq!(
    pending.region(),
    &ExtractedRegion::Cropped(BoundingBox::new(390, 390, 220, 220))
  );

  let artifacts = session.complete(pending).unwrap();
  assert_eq!(artifacts.text, TEXT);
  assert_eq!((artifacts.qr_crop.width(), artifacts.qr_crop.height()), (220, 220));
  assert_eq!(artifacts.patch_region, BoundingBox::new(66, 66, 88, 88));
  assert_eq!(artifacts.patch_region.center(), (110.0, 110.0));
  assert_eq!((artifacts.cdp_patch.width(), artifacts.cdp_patch.height()), (88, 88));
  assert_eq!(artifacts.cdp_patch.pixel(0, 0), [10, 20, 30, 255]);
  assert!(!artifacts.qr_png().unwrap().is_empty());
  assert!(!artifacts.cdp_png().unwrap().is_empty());
}

#[test]
fn identical_boxes_commit_but_shifted_box_does_not() {
  let config = CaptureConfig {
    padding_ratio: 0.0,
    ..CaptureConfig::default()
  };
  let frame = RgbaFrame::filled(1000, 1000, [255, 255, 255, 255]);
  let steady = Some(quad(100.0, 100.0, 300.0, 300.0));

  let mut session = started(config.clone(), vec![steady.clone(); 4]);
  for _ in 0..3 {
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Unstable { .. }));
  }
  assert!(matches!(session.on_frame(&frame), FrameOutcome::Committed(_)));

  let shifted = Some(quad(130.0, 100.0, 330.0, 300.0));
  let mut session = started(
    config,
    vec![steady.clone(), steady.clone(), steady, shifted],
  );
  for _ in 0..3 {
    session.on_frame(&frame);
  }
  assert!(matches!(
    session.on_frame(&frame),
    FrameOutcome::Unstable {
      samples: 4,
      required: 4
    }
  ));
  assert!(!session.is_locked());
}

#[test]
fn two_corner_points_fall_back_to_centered_square() {
  let frame = RgbaFrame::filled(640, 480, [0, 0, 0, 255]);
  let mut session = started(
    immediate(),
    vec![Some(vec![Point2D::new(10.0, 10.0), Point2D::new(90.0, 10.0)])],
  );
  let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
    panic!("expected a committed capture");
  };
  assert_eq!(
    pending.region(),
    &ExtractedRegion::Cropped(BoundingBox::new(200, 120, 240, 240))
  );
}

#[test]
fn three_points_are_completed_for_perspective_extraction() {
  let frame = RgbaFrame::filled(200, 200, [90, 90, 90, 255]);
  let config = CaptureConfig {
    strategy: ExtractStrategy::Perspective { side: 64 },
    ..immediate()
  };
  let mut session = started(
    config,
    vec![Some(vec![
      Point2D::new(50.0, 50.0),
      Point2D::new(150.0, 50.0),
      Point2D::new(50.0, 150.0),
    ])],
  );
  let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
    panic!("expected a committed capture");
  };
  let ExtractedRegion::Warped { corners, side, .. } = pending.region() else {
    panic!("expected a warped region");
  };
  assert_eq!(*side, 64);
  assert_eq!(corners.bottom_right, Point2D::new(150.0, 150.0));

  let artifacts = session.complete(pending).unwrap();
  assert_eq!(artifacts.qr_crop.width(), 64);
  assert_eq!(artifacts.cdp_patch.width(), 25);
}

#[test]
fn session_commits_only_once() {
  let frame = RgbaFrame::filled(100, 100, [0, 0, 0, 255]);
  let mut session = started(
    immediate(),
    vec![Some(quad(10.0, 10.0, 60.0, 60.0)); 5],
  );
  assert!(matches!(session.on_frame(&frame), FrameOutcome::Committed(_)));
  for _ in 0..4 {
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Ignored));
  }
  assert!(session.is_locked());
}

#[test]
fn reset_starts_a_fresh_session() {
  let frame = RgbaFrame::filled(100, 100, [0, 0, 0, 255]);
  let mut session = started(
    immediate(),
    vec![Some(quad(10.0, 10.0, 60.0, 60.0)); 2],
  );
  let FrameOutcome::Committed(stale) = session.on_frame(&frame) else {
    panic!("expected a committed capture");
  };
  session.reset();
  session.start();

  let FrameOutcome::Committed(fresh) = session.on_frame(&frame) else {
    panic!("expected a committed capture after reset");
  };
  assert!(matches!(session.complete(stale), Err(CaptureError::Cancelled)));
  assert!(session.complete(fresh).is_ok());
  assert_eq!(session.state(), CaptureState::Done);
}

#[derive(Debug)]
struct FailingEnhancer;

impl ExternalEnhancer for FailingEnhancer {
  type Error = std::io::Error;

  async fn enhance(&self, _image: RgbaFrame) -> Result<RgbaFrame, Self::Error> {
    Err(std::io::Error::other("模型不可用"))
  }
}

#[test]
fn enhancer_failure_respects_retry_setting() {
  let frame = RgbaFrame::filled(100, 100, [0, 0, 0, 255]);

  let mut session = started(immediate(), vec![Some(quad(10.0, 10.0, 60.0, 60.0))]);
  let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
    panic!("expected a committed capture");
  };
  let result = pollster::block_on(session.complete_with(pending, &FailingEnhancer));
  assert!(matches!(result, Err(CaptureError::EnhancerError(_))));
  assert_eq!(session.state(), CaptureState::Error);

  let config = CaptureConfig {
    retry_on_failure: true,
    ..immediate()
  };
  let mut session = started(config, vec![Some(quad(10.0, 10.0, 60.0, 60.0)); 2]);
  let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
    panic!("expected a committed capture");
  };
  assert!(pollster::block_on(session.complete_with(pending, &FailingEnhancer)).is_err());
  assert_eq!(session.state(), CaptureState::Scanning);
  assert!(matches!(session.on_frame(&frame), FrameOutcome::Committed(_)));
}

/// 记录每次渲染的解码文本
#[derive(Clone, Default)]
struct Recorder {
  texts: Rc<RefCell<Vec<String>>>,
}

impl Render<RgbaFrame, CaptureArtifacts> for Recorder {
  type Error = Infallible;

  fn render_result(&self, _frame: &RgbaFrame, result: &CaptureArtifacts) -> Result<(), Infallible> {
    self.texts.borrow_mut().push(result.text.clone());
    Ok(())
  }
}

#[test]
fn continuous_task_stops_after_first_capture() {
  let frame = RgbaFrame::filled(300, 300, [200, 200, 200, 255]);
  let input = ImageFileInput::new(frame, 10);
  let session = CaptureSession::new(
    CaptureConfig::default(),
    ScriptedDecoder::new(vec![Some(quad(100.0, 100.0, 200.0, 200.0)); 10]),
  )
  .unwrap();
  let recorder = Recorder::default();

  let artifacts = ContinuousTask::new()
    .with_enhancer(Some(ResizeEnhancer::new(2)))
    .run_task(input, session, recorder.clone())
    .unwrap()
    .unwrap();

  assert_eq!(recorder.texts.borrow().as_slice(), [TEXT.to_string()]);
  assert_eq!(artifacts.qr_crop.width(), 220);
  assert_eq!(artifacts.cdp_patch.width(), 88);
}

#[test]
fn continuous_task_honours_frame_limit() {
  let frame = RgbaFrame::filled(300, 300, [200, 200, 200, 255]);
  let input = ImageFileInput::new(frame, 10);
  let session = CaptureSession::new(
    CaptureConfig::default(),
    ScriptedDecoder::new(vec![Some(quad(100.0, 100.0, 200.0, 200.0)); 10]),
  )
  .unwrap();
  let recorder = Recorder::default();

  let captured = ContinuousTask::new()
    .with_frame_number(Some(3))
    .run_task(input, session, recorder.clone())
    .unwrap();

  assert!(captured.is_none());
  assert!(recorder.texts.borrow().is_empty());
}
