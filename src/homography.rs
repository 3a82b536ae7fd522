// 该文件是 Jianma （鉴码） 项目的一部分。
// src/homography.rs - 单应性求解与透视校正
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

//! 将边长为 `S` 的标准正方形映射到检测到的四边形上。
//!
//! 求解采用直接线性变换（DLT）：四组对应点给出 8 个方程，
//! 末项系数固定为 1，其余 8 个未知数用带部分主元的高斯消元求解。
//! 近乎共线的角点会导致主元接近零，此时跳过该列，
//! 对应系数保持单位变换中的初值，得到可能失真但可用的结果。

use tracing::{debug, warn};

use crate::{
  frame::RgbaFrame,
  geometry::{Corners, Point2D},
};

/// 主元小于该值时视为奇异
pub const PIVOT_EPSILON: f64 = 1e-9;

const WHITE: [u8; 4] = [255, 255, 255, 255];

/// 3×3 射影变换，行优先存储，`h[8]` 恒为 1
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Homography {
  h: [f64; 9],
}

impl Default for Homography {
  fn default() -> Self {
    Self::identity()
  }
}

impl Homography {
  pub const fn identity() -> Self {
    Self {
      h: [1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
    }
  }

  /// 由任意 3×3 矩阵构造，并按右下角元素归一化。
  /// 右下角为零时无法归一化，返回 `None`。
  pub fn from_matrix(m: [[f64; 3]; 3]) -> Option<Self> {
    let scale = m[2][2];
    if scale.abs() < PIVOT_EPSILON {
      return None;
    }
    let mut h = [0.0; 9];
    for (i, row) in m.iter().enumerate() {
      for (j, v) in row.iter().enumerate() {
        h[i * 3 + j] = v / scale;
      }
    }
    Some(Self { h })
  }

  pub fn coefficients(&self) -> &[f64; 9] {
    &self.h
  }

  /// 求解把 `src[i]` 映射到 `dst[i]` 的单应性
  pub fn from_correspondences(src: &[Point2D; 4], dst: &[Point2D; 4]) -> Self {
    let mut a = [[0.0f64; 8]; 8];
    let mut b = [0.0f64; 8];

    for i in 0..4 {
      let (x, y) = (src[i].x, src[i].y);
      let (u, v) = (dst[i].x, dst[i].y);

      let row = i * 2;
      a[row] = [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y];
      b[row] = u;
      a[row + 1] = [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y];
      b[row + 1] = v;
    }

    let identity = Self::identity();
    let mut initial = [0.0f64; 8];
    initial.copy_from_slice(&identity.h[..8]);

    let solution = solve_with_pivot_skip(a, b, initial);
    let mut h = [0.0f64; 9];
    h[..8].copy_from_slice(&solution);
    h[8] = 1.0;
    Self { h }
  }

  /// 标准正方形 `(0,0) (S,0) (S,S) (0,S)` 到角点（左上、右上、右下、左下）的映射
  pub fn from_square(corners: &Corners, side: u32) -> Self {
    let s = side as f64;
    let square = [
      Point2D::new(0.0, 0.0),
      Point2D::new(s, 0.0),
      Point2D::new(s, s),
      Point2D::new(0.0, s),
    ];
    Self::from_correspondences(&square, &corners.to_array())
  }

  /// 应用变换；分母接近零时返回 `None`
  pub fn map(&self, p: &Point2D) -> Option<Point2D> {
    let h = &self.h;
    let denominator = h[6] * p.x + h[7] * p.y + h[8];
    if denominator.abs() < PIVOT_EPSILON {
      return None;
    }
    Some(Point2D::new(
      (h[0] * p.x + h[1] * p.y + h[2]) / denominator,
      (h[3] * p.x + h[4] * p.y + h[5]) / denominator,
    ))
  }
}

/// 高斯消元，主元过小时跳过该列。
///
/// 被跳过的未知数在回代时保留 `initial` 中的值。
#[allow(clippy::needless_range_loop)]
fn solve_with_pivot_skip(mut a: [[f64; 8]; 8], mut b: [f64; 8], initial: [f64; 8]) -> [f64; 8] {
  let n = 8;
  let mut skipped = 0usize;

  for col in 0..n {
    let mut max_val = a[col][col].abs();
    let mut max_row = col;
    for row in (col + 1)..n {
      if a[row][col].abs() > max_val {
        max_val = a[row][col].abs();
        max_row = row;
      }
    }

    if max_val < PIVOT_EPSILON {
      skipped += 1;
      continue;
    }

    if max_row != col {
      a.swap(col, max_row);
      b.swap(col, max_row);
    }

    for row in (col + 1)..n {
      let factor = a[row][col] / a[col][col];
      if factor == 0.0 {
        continue;
      }
      b[row] -= factor * b[col];
      for k in col..n {
        a[row][k] -= factor * a[col][k];
      }
    }
  }

  let mut x = initial;
  for i in (0..n).rev() {
    if a[i][i].abs() < PIVOT_EPSILON {
      continue;
    }
    let mut sum = b[i];
    for j in (i + 1)..n {
      sum -= a[i][j] * x[j];
    }
    x[i] = sum / a[i][i];
  }

  if skipped > 0 {
    warn!("单应性方程组接近奇异，跳过 {} 个主元列", skipped);
  }

  x
}

/// 用单应性把源帧重采样为 `side × side` 的正方形。
///
/// 目标像素 `(x, y)` 对应源坐标 `H · (x, y, 1)`，最近邻采样；
/// 落在源帧外的像素写为不透明白色。
pub fn warp_square(source: &RgbaFrame, homography: &Homography, side: u32) -> RgbaFrame {
  let side = side as usize;
  let mut output = RgbaFrame::with_shape(side, side);
  let (width, height) = (source.width() as f64, source.height() as f64);
  let mut outside = 0usize;

  for y in 0..side {
    for x in 0..side {
      let sample = homography
        .map(&Point2D::new(x as f64, y as f64))
        .map(|p| (p.x.round(), p.y.round()))
        .filter(|(sx, sy)| *sx >= 0.0 && *sy >= 0.0 && *sx < width && *sy < height);

      let rgba = match sample {
        Some((sx, sy)) => source.pixel(sx as usize, sy as usize),
        None => {
          outside += 1;
          WHITE
        }
      };
      output.put_pixel(x, y, rgba);
    }
  }

  debug!(
    "透视校正完成: {}x{}, 越界像素 {}",
    side, side, outside
  );

  output
}
