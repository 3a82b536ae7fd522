// 该文件是 Jianma （鉴码） 项目的一部分。
// src/stability.rs - 检测框稳定性跟踪
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

use std::collections::VecDeque;

use tracing::trace;

use crate::geometry::BoundingBox;

pub const DEFAULT_STABILITY_FRAMES: usize = 4;
pub const DEFAULT_POSITION_TOL_PX: f64 = 8.0;
pub const DEFAULT_SIZE_TOL_RATIO: f64 = 0.18;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stability {
  Unstable,
  Stable,
}

/// 最近若干帧检测框的定长窗口（先进先出）。
///
/// 窗口填满且每个样本都与平均框一致时才算稳定，
/// 各样本等权，不做指数平滑。
#[derive(Debug, Clone)]
pub struct StabilityTracker {
  window: VecDeque<BoundingBox>,
  capacity: usize,
  position_tol_px: f64,
  size_tol_ratio: f64,
}

impl Default for StabilityTracker {
  fn default() -> Self {
    Self::new(
      DEFAULT_STABILITY_FRAMES,
      DEFAULT_POSITION_TOL_PX,
      DEFAULT_SIZE_TOL_RATIO,
    )
  }
}

impl StabilityTracker {
  pub fn new(capacity: usize, position_tol_px: f64, size_tol_ratio: f64) -> Self {
    let capacity = capacity.max(1);
    Self {
      window: VecDeque::with_capacity(capacity),
      capacity,
      position_tol_px,
      size_tol_ratio,
    }
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn len(&self) -> usize {
    self.window.len()
  }

  pub fn is_empty(&self) -> bool {
    self.window.is_empty()
  }

  pub fn samples(&self) -> impl Iterator<Item = &BoundingBox> {
    self.window.iter()
  }

  pub fn push(&mut self, bbox: BoundingBox) {
    self.window.push_back(bbox);
    while self.window.len() > self.capacity {
      self.window.pop_front();
    }
    trace!("稳定性窗口: {}/{} {:?}", self.window.len(), self.capacity, bbox);
  }

  pub fn clear(&mut self) {
    self.window.clear();
  }

  fn mean(&self) -> Option<(f64, f64, f64, f64)> {
    if self.window.is_empty() {
      return None;
    }
    let n = self.window.len() as f64;
    let (sx, sy, sw, sh) = self
      .window
      .iter()
      .fold((0.0, 0.0, 0.0, 0.0), |(x, y, w, h), b| {
        (
          x + b.x as f64,
          y + b.y as f64,
          w + b.w as f64,
          h + b.h as f64,
        )
      });
    Some((sx / n, sy / n, sw / n, sh / n))
  }

  /// 窗口内各样本的分量均值，四舍五入为整数
  pub fn average_box(&self) -> Option<BoundingBox> {
    self.mean().map(|(x, y, w, h)| {
      BoundingBox::new(
        x.round() as u32,
        y.round() as u32,
        w.round() as u32,
        h.round() as u32,
      )
    })
  }

  pub fn is_stable(&self) -> bool {
    if self.window.len() < self.capacity {
      return false;
    }
    let Some((ax, ay, aw, ah)) = self.mean() else {
      return false;
    };
    if aw <= 0.0 || ah <= 0.0 {
      return false;
    }
    let (acx, acy) = (ax + aw / 2.0, ay + ah / 2.0);

    self.window.iter().all(|b| {
      let (cx, cy) = b.center();
      let dw = (b.w as f64 - aw).abs() / aw;
      let dh = (b.h as f64 - ah).abs() / ah;
      (cx - acx).abs() <= self.position_tol_px
        && (cy - acy).abs() <= self.position_tol_px
        && dw <= self.size_tol_ratio
        && dh <= self.size_tol_ratio
    })
  }

  pub fn state(&self) -> Stability {
    if self.is_stable() {
      Stability::Stable
    } else {
      Stability::Unstable
    }
  }
}
