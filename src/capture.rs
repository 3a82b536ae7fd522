// 该文件是 Jianma （鉴码） 项目的一部分。
// src/capture.rs - 采集会话与状态机
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

//! 一次扫描会话：逐帧检测、等待稳定、锁定后只提取一次。
//!
//! ```text
//! Idle -> Scanning -> Locked -> Extracting -> Done
//!            ^   |                 |
//!            |   v                 v
//!          Rejected              Error
//! ```
//!
//! 会话的全部可变状态（锁定标志、稳定窗口）都在 [`CaptureSession`] 内，
//! 不与其他会话共享。锁定后的提取分两步：[`CaptureSession::on_frame`]
//! 同步完成裁剪并返回 [`PendingCapture`]，随后由调用方选择
//! [`CaptureSession::complete`] 直接完成，或 [`CaptureSession::complete_with`]
//! 先等待一次外部增强再完成。

use std::fmt;

use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::{
  config::{CaptureConfig, ConfigError},
  detect::{Detector, SymbolDecoder},
  enhance::ExternalEnhancer,
  frame::{FrameError, RgbaFrame},
  geometry::{BoundingBox, Point2D},
  patch::{PatchError, sample_center_patch},
  region::{ExtractedRegion, RegionError, bounding_region, extract},
  stability::StabilityTracker,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
  Idle,
  Scanning,
  /// 上一帧未检测到或不稳定，下一帧继续扫描
  Rejected,
  Locked,
  Extracting,
  Done,
  Error,
}

impl fmt::Display for CaptureState {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      CaptureState::Idle => "空闲",
      CaptureState::Scanning => "扫描中",
      CaptureState::Rejected => "已拒绝",
      CaptureState::Locked => "已锁定",
      CaptureState::Extracting => "提取中",
      CaptureState::Done => "完成",
      CaptureState::Error => "错误",
    };
    f.write_str(name)
  }
}

#[derive(Error, Debug)]
pub enum CaptureError {
  #[error("区域提取失败: {0}")]
  RegionError(#[from] RegionError),
  #[error("中心块采样失败: {0}")]
  PatchError(#[from] PatchError),
  #[error("外部增强失败: {0}")]
  EnhancerError(Box<dyn std::error::Error + Send + Sync>),
  #[error("采集已被取消")]
  Cancelled,
  #[error("会话状态为 {0}，无法完成采集")]
  NotExtracting(CaptureState),
}

/// 每一帧的处理结果
#[derive(Debug)]
pub enum FrameOutcome {
  /// 会话未在扫描（未启动、已锁定或已结束），帧被忽略
  Ignored,
  /// 帧尺寸为 0，资源尚未就绪
  NotReady,
  NoDetection,
  Unstable { samples: usize, required: usize },
  /// 已锁定并完成裁剪，等待完成
  Committed(PendingCapture),
  /// 锁定后的提取失败
  Failed(CaptureError),
}

/// 锁定后已裁剪、尚未增强的采集
#[derive(Debug)]
pub struct PendingCapture {
  generation: u64,
  text: String,
  points: Vec<Point2D>,
  region: ExtractedRegion,
  qr_crop: RgbaFrame,
}

impl PendingCapture {
  pub fn text(&self) -> &str {
    &self.text
  }

  pub fn region(&self) -> &ExtractedRegion {
    &self.region
  }
}

/// 一次成功采集交给外部的全部产物
#[derive(Debug, Clone)]
pub struct CaptureArtifacts {
  pub text: String,
  pub points: Vec<Point2D>,
  pub region: ExtractedRegion,
  pub qr_crop: RgbaFrame,
  pub cdp_patch: RgbaFrame,
  /// 中心块在（外部增强后的）QR 裁剪中的位置
  pub patch_region: BoundingBox,
}

impl CaptureArtifacts {
  pub fn qr_png(&self) -> Result<Vec<u8>, FrameError> {
    self.qr_crop.encode_png()
  }

  pub fn cdp_png(&self) -> Result<Vec<u8>, FrameError> {
    self.cdp_patch.encode_png()
  }
}

pub struct CaptureSession<D> {
  config: CaptureConfig,
  detector: Detector<D>,
  tracker: StabilityTracker,
  state: CaptureState,
  locked: bool,
  generation: u64,
}

impl<D: SymbolDecoder> CaptureSession<D> {
  pub fn new(config: CaptureConfig, decoder: D) -> Result<Self, ConfigError> {
    config.validate()?;
    let tracker = StabilityTracker::new(
      config.stability_frames,
      config.position_tol_px,
      config.size_tol_ratio,
    );
    Ok(Self {
      config,
      detector: Detector::new(decoder),
      tracker,
      state: CaptureState::Idle,
      locked: false,
      generation: 0,
    })
  }

  pub fn config(&self) -> &CaptureConfig {
    &self.config
  }

  pub fn state(&self) -> CaptureState {
    self.state
  }

  pub fn is_locked(&self) -> bool {
    self.locked
  }

  pub fn is_done(&self) -> bool {
    self.state == CaptureState::Done
  }

  /// 会话已结束（完成或出错），输入源可以释放
  pub fn is_finished(&self) -> bool {
    matches!(self.state, CaptureState::Done | CaptureState::Error)
  }

  pub fn tracker(&self) -> &StabilityTracker {
    &self.tracker
  }

  pub fn start(&mut self) {
    if self.state == CaptureState::Idle {
      info!("开始扫描");
      self.state = CaptureState::Scanning;
    }
  }

  /// 结束会话：丢弃稳定窗口与未完成的采集，回到空闲状态
  pub fn reset(&mut self) {
    if self.state == CaptureState::Extracting {
      warn!("会话重置，丢弃未完成的采集");
    }
    self.tracker.clear();
    self.locked = false;
    self.generation = self.generation.wrapping_add(1);
    self.state = CaptureState::Idle;
    debug!("会话已重置 (第 {} 代)", self.generation);
  }

  pub fn on_frame(&mut self, frame: &RgbaFrame) -> FrameOutcome {
    if self.locked || !matches!(self.state, CaptureState::Scanning | CaptureState::Rejected) {
      return FrameOutcome::Ignored;
    }

    if frame.is_empty() {
      debug!("帧尺寸为 0，跳过");
      return FrameOutcome::NotReady;
    }

    let Some(detection) = self.detector.detect(frame) else {
      self.tracker.clear();
      self.state = CaptureState::Rejected;
      return FrameOutcome::NoDetection;
    };

    if self.config.stability_enabled {
      let bbox = bounding_region(
        &detection.points,
        frame.width(),
        frame.height(),
        self.config.padding_ratio,
        self.config.fallback_fraction,
      );
      self.tracker.push(bbox);
      if !self.tracker.is_stable() {
        self.state = CaptureState::Rejected;
        debug!(
          "检测框尚未稳定: {}/{}",
          self.tracker.len(),
          self.tracker.capacity()
        );
        return FrameOutcome::Unstable {
          samples: self.tracker.len(),
          required: self.tracker.capacity(),
        };
      }
    }

    self.locked = true;
    self.state = CaptureState::Locked;
    info!("已锁定 QR 码: {:?}", detection.text);
    self.tracker.clear();

    self.state = CaptureState::Extracting;
    match extract(
      frame,
      &detection.points,
      self.config.strategy,
      self.config.padding_ratio,
      self.config.fallback_fraction,
    ) {
      Ok((qr_crop, region)) => FrameOutcome::Committed(PendingCapture {
        generation: self.generation,
        text: detection.text,
        points: detection.points,
        region,
        qr_crop,
      }),
      Err(e) => FrameOutcome::Failed(self.fail(e.into())),
    }
  }

  fn fail(&mut self, err: CaptureError) -> CaptureError {
    if self.config.retry_on_failure {
      warn!("采集失败，请靠近并保持稳定后重试: {}", err);
      self.locked = false;
      self.tracker.clear();
      self.state = CaptureState::Scanning;
    } else {
      error!("采集失败: {}", err);
      self.state = CaptureState::Error;
    }
    err
  }

  fn check_pending(&self, pending: &PendingCapture) -> Result<(), CaptureError> {
    if pending.generation != self.generation {
      return Err(CaptureError::Cancelled);
    }
    if self.state != CaptureState::Extracting {
      return Err(CaptureError::NotExtracting(self.state));
    }
    Ok(())
  }

  fn finish(&mut self, pending: PendingCapture) -> Result<CaptureArtifacts, CaptureError> {
    let PendingCapture {
      text,
      points,
      region,
      qr_crop,
      ..
    } = pending;
    let (patch, patch_region) = match sample_center_patch(&qr_crop, self.config.center_fraction) {
      Ok(sampled) => sampled,
      Err(e) => return Err(self.fail(e.into())),
    };

    let qr_crop = match &self.config.qr_enhance {
      Some(params) => params.apply(&qr_crop),
      None => qr_crop,
    };
    let cdp_patch = match &self.config.patch_enhance {
      Some(params) => params.apply(&patch),
      None => patch,
    };

    self.state = CaptureState::Done;
    info!(
      "采集完成: QR {}x{}, CDP {}x{}",
      qr_crop.width(),
      qr_crop.height(),
      cdp_patch.width(),
      cdp_patch.height()
    );

    Ok(CaptureArtifacts {
      text,
      points,
      region,
      qr_crop,
      cdp_patch,
      patch_region,
    })
  }

  /// 同步完成采集
  pub fn complete(&mut self, pending: PendingCapture) -> Result<CaptureArtifacts, CaptureError> {
    self.check_pending(&pending)?;
    self.finish(pending)
  }

  /// 先把 QR 裁剪交给外部增强器，等待其结果后再采样中心块并完成
  pub async fn complete_with<E: ExternalEnhancer>(
    &mut self,
    mut pending: PendingCapture,
    enhancer: &E,
  ) -> Result<CaptureArtifacts, CaptureError> {
    self.check_pending(&pending)?;
    let raw = std::mem::replace(&mut pending.qr_crop, RgbaFrame::with_shape(0, 0));
    pending.qr_crop = match enhancer.enhance(raw).await {
      Ok(enhanced) => enhanced,
      Err(e) => return Err(self.fail(CaptureError::EnhancerError(Box::new(e)))),
    };
    self.finish(pending)
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;
  use std::collections::VecDeque;
  use std::convert::Infallible;

  use super::*;
  use crate::{
    config::ExtractStrategy,
    detect::PlainSymbol,
    enhance::{EnhanceParams, ResizeEnhancer},
  };

  struct QueueDecoder {
    queue: RefCell<VecDeque<Option<PlainSymbol>>>,
  }

  impl QueueDecoder {
    fn new(items: Vec<Option<PlainSymbol>>) -> Self {
      Self {
        queue: RefCell::new(items.into()),
      }
    }
  }

  impl SymbolDecoder for QueueDecoder {
    type Symbol = PlainSymbol;
    type Error = Infallible;

    fn decode(&self, _pixels: &RgbaFrame) -> Result<Option<PlainSymbol>, Infallible> {
      Ok(self.queue.borrow_mut().pop_front().flatten())
    }
  }

  fn square(x: f64, y: f64, side: f64) -> Option<PlainSymbol> {
    Some(PlainSymbol {
      text: "https://example.com/p/42".into(),
      points: vec![
        Point2D::new(x, y),
        Point2D::new(x + side, y),
        Point2D::new(x + side, y + side),
        Point2D::new(x, y + side),
      ],
    })
  }

  fn session(items: Vec<Option<PlainSymbol>>, config: CaptureConfig) -> CaptureSession<QueueDecoder> {
    let mut session = CaptureSession::new(config, QueueDecoder::new(items)).unwrap();
    session.start();
    session
  }

  #[test]
  fn idle_session_ignores_frames() {
    let mut session =
      CaptureSession::new(CaptureConfig::default(), QueueDecoder::new(vec![square(10.0, 10.0, 20.0)]))
        .unwrap();
    let frame = RgbaFrame::filled(64, 64, [255, 255, 255, 255]);
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Ignored));
    assert_eq!(session.state(), CaptureState::Idle);
  }

  #[test]
  fn zero_sized_frame_is_not_ready() {
    let mut session = session(vec![], CaptureConfig::default());
    assert!(matches!(
      session.on_frame(&RgbaFrame::with_shape(0, 0)),
      FrameOutcome::NotReady
    ));
    assert_eq!(session.state(), CaptureState::Scanning);
  }

  #[test]
  fn commits_after_stable_window_and_locks() {
    let frame = RgbaFrame::filled(200, 200, [200, 200, 200, 255]);
    let mut session = session(vec![square(50.0, 50.0, 100.0); 6], CaptureConfig::default());

    for expected in 1..4 {
      match session.on_frame(&frame) {
        FrameOutcome::Unstable { samples, required } => {
          assert_eq!(samples, expected);
          assert_eq!(required, 4);
        }
        other => panic!("unexpected outcome {:?}", other),
      }
    }

    let pending = match session.on_frame(&frame) {
      FrameOutcome::Committed(pending) => pending,
      other => panic!("unexpected outcome {:?}", other),
    };
    assert!(session.is_locked());
    assert_eq!(session.state(), CaptureState::Extracting);
    assert_eq!(
      pending.region(),
      &ExtractedRegion::Cropped(BoundingBox::new(45, 45, 110, 110))
    );

    // 锁定后其余帧一律忽略
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Ignored));

    let artifacts = session.complete(pending).unwrap();
    assert_eq!(session.state(), CaptureState::Done);
    assert_eq!(artifacts.qr_crop.width(), 110);
    assert_eq!(artifacts.cdp_patch.width(), 44);
    assert_eq!(artifacts.patch_region, BoundingBox::new(33, 33, 44, 44));
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Ignored));
  }

  #[test]
  fn detection_gap_clears_history() {
    let frame = RgbaFrame::filled(200, 200, [200, 200, 200, 255]);
    let b = square(50.0, 50.0, 100.0);
    let mut session = session(
      vec![b.clone(), b.clone(), b.clone(), None, b.clone(), b.clone()],
      CaptureConfig::default(),
    );
    for _ in 0..3 {
      session.on_frame(&frame);
    }
    assert!(matches!(session.on_frame(&frame), FrameOutcome::NoDetection));
    assert_eq!(session.state(), CaptureState::Rejected);
    assert!(session.tracker().is_empty());
    assert!(matches!(
      session.on_frame(&frame),
      FrameOutcome::Unstable { samples: 1, .. }
    ));
  }

  #[test]
  fn stability_can_be_disabled() {
    let frame = RgbaFrame::filled(100, 100, [0, 0, 0, 255]);
    let config = CaptureConfig {
      stability_enabled: false,
      ..CaptureConfig::default()
    };
    let mut session = session(vec![square(10.0, 10.0, 50.0)], config);
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Committed(_)));
  }

  #[test]
  fn failed_extraction_ends_in_error_without_retry() {
    // 1x1 帧上角点不足，退化为 0 尺寸的中央正方形
    let frame = RgbaFrame::filled(1, 1, [0, 0, 0, 255]);
    let config = CaptureConfig {
      stability_enabled: false,
      ..CaptureConfig::default()
    };
    let mut session = session(
      vec![Some(PlainSymbol {
        text: "x".into(),
        points: vec![],
      })],
      config,
    );
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Failed(_)));
    assert_eq!(session.state(), CaptureState::Error);
    assert!(session.is_finished());
  }

  #[test]
  fn failed_extraction_with_retry_returns_to_scanning() {
    let frame = RgbaFrame::filled(1, 1, [0, 0, 0, 255]);
    let config = CaptureConfig {
      stability_enabled: false,
      retry_on_failure: true,
      ..CaptureConfig::default()
    };
    let mut session = session(
      vec![Some(PlainSymbol {
        text: "x".into(),
        points: vec![],
      })],
      config,
    );
    assert!(matches!(session.on_frame(&frame), FrameOutcome::Failed(_)));
    assert_eq!(session.state(), CaptureState::Scanning);
    assert!(!session.is_locked());
  }

  #[test]
  fn reset_cancels_pending_capture() {
    let frame = RgbaFrame::filled(100, 100, [0, 0, 0, 255]);
    let config = CaptureConfig {
      stability_enabled: false,
      ..CaptureConfig::default()
    };
    let mut session = session(vec![square(10.0, 10.0, 50.0)], config);
    let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
      panic!("expected commit");
    };
    session.reset();
    assert!(!session.is_locked());
    assert_eq!(session.state(), CaptureState::Idle);
    assert!(matches!(session.complete(pending), Err(CaptureError::Cancelled)));
  }

  #[test]
  fn external_enhancer_runs_before_patch_sampling() {
    let frame = RgbaFrame::filled(100, 100, [40, 40, 40, 255]);
    let config = CaptureConfig {
      stability_enabled: false,
      strategy: ExtractStrategy::Perspective { side: 50 },
      patch_enhance: Some(EnhanceParams::unsharp(0.5)),
      ..CaptureConfig::default()
    };
    let mut session = session(vec![square(20.0, 20.0, 50.0)], config);
    let FrameOutcome::Committed(pending) = session.on_frame(&frame) else {
      panic!("expected commit");
    };
    let artifacts =
      pollster::block_on(session.complete_with(pending, &ResizeEnhancer::new(2))).unwrap();
    assert_eq!(artifacts.qr_crop.width(), 100);
    assert_eq!(artifacts.cdp_patch.width(), 40);
    assert!(session.is_done());
  }
}
