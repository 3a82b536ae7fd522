// 该文件是 Jianma （鉴码） 项目的一部分。
// src/geometry.rs - 点、角点与包围框
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

use std::ops::{Add, Sub};

/// 图像坐标系中的点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point2D {
  pub x: f64,
  pub y: f64,
}

impl Point2D {
  pub const fn new(x: f64, y: f64) -> Self {
    Self { x, y }
  }

  pub fn distance(&self, other: &Point2D) -> f64 {
    let dx = self.x - other.x;
    let dy = self.y - other.y;
    (dx * dx + dy * dy).sqrt()
  }

  pub fn translate(&self, dx: f64, dy: f64) -> Point2D {
    Point2D::new(self.x + dx, self.y + dy)
  }
}

impl Add for Point2D {
  type Output = Point2D;

  fn add(self, rhs: Point2D) -> Point2D {
    Point2D::new(self.x + rhs.x, self.y + rhs.y)
  }
}

impl Sub for Point2D {
  type Output = Point2D;

  fn sub(self, rhs: Point2D) -> Point2D {
    Point2D::new(self.x - rhs.x, self.y - rhs.y)
  }
}

/// QR 码四边形的四个角点，顺序为左上、右上、右下、左下
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Corners {
  pub top_left: Point2D,
  pub top_right: Point2D,
  pub bottom_right: Point2D,
  pub bottom_left: Point2D,
}

impl Corners {
  pub fn new(
    top_left: Point2D,
    top_right: Point2D,
    bottom_right: Point2D,
    bottom_left: Point2D,
  ) -> Self {
    Self {
      top_left,
      top_right,
      bottom_right,
      bottom_left,
    }
  }

  /// 由三个定位点补全右下角：`br = tr + (bl - tl)`。
  ///
  /// 这是平行四边形近似，仅在正视且无透视畸变时精确。
  /// 下游匹配可能已按此偏差标定，不要改为真正的射影补全。
  pub fn from_three(top_left: Point2D, top_right: Point2D, bottom_left: Point2D) -> Self {
    let bottom_right = top_right + (bottom_left - top_left);
    Self::new(top_left, top_right, bottom_right, bottom_left)
  }

  pub fn from_slice(points: &[Point2D]) -> Option<Self> {
    match points {
      [tl, tr, br, bl, ..] => Some(Self::new(*tl, *tr, *br, *bl)),
      [tl, tr, bl] => Some(Self::from_three(*tl, *tr, *bl)),
      _ => None,
    }
  }

  pub fn to_array(&self) -> [Point2D; 4] {
    [
      self.top_left,
      self.top_right,
      self.bottom_right,
      self.bottom_left,
    ]
  }

  pub fn translate(&self, dx: f64, dy: f64) -> Corners {
    let [tl, tr, br, bl] = self.to_array().map(|p| p.translate(dx, dy));
    Corners::new(tl, tr, br, bl)
  }
}

/// 轴对齐整数包围框
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BoundingBox {
  pub x: u32,
  pub y: u32,
  pub w: u32,
  pub h: u32,
}

impl BoundingBox {
  pub const fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
    Self { x, y, w, h }
  }

  /// 由浮点边界 `[x0, x1) × [y0, y1)` 构造，并裁剪到帧范围内。
  /// 左上角向下取整，右下角向上取整。
  pub fn from_extent_clamped(
    x0: f64,
    y0: f64,
    x1: f64,
    y1: f64,
    frame_width: usize,
    frame_height: usize,
  ) -> Self {
    let fw = frame_width as f64;
    let fh = frame_height as f64;
    let left = x0.floor().clamp(0.0, fw);
    let top = y0.floor().clamp(0.0, fh);
    let right = x1.ceil().clamp(left, fw);
    let bottom = y1.ceil().clamp(top, fh);

    Self {
      x: left as u32,
      y: top as u32,
      w: (right - left) as u32,
      h: (bottom - top) as u32,
    }
  }

  pub fn center(&self) -> (f64, f64) {
    (
      self.x as f64 + self.w as f64 / 2.0,
      self.y as f64 + self.h as f64 / 2.0,
    )
  }

  pub fn right(&self) -> u32 {
    self.x + self.w
  }

  pub fn bottom(&self) -> u32 {
    self.y + self.h
  }

  pub fn is_empty(&self) -> bool {
    self.w == 0 || self.h == 0
  }

  pub fn fits_within(&self, frame_width: usize, frame_height: usize) -> bool {
    self.right() as usize <= frame_width && self.bottom() as usize <= frame_height
  }
}
