// 该文件是 Jianma （鉴码） 项目的一部分。
// src/region.rs - QR 区域提取
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

use thiserror::Error;
use tracing::{debug, info};

use crate::{
  config::ExtractStrategy,
  frame::{FrameError, RgbaFrame},
  geometry::{BoundingBox, Corners, Point2D},
  homography::{Homography, warp_square},
};

#[derive(Error, Debug)]
pub enum RegionError {
  #[error("提取区域为空: {0:?}")]
  EmptyRegion(BoundingBox),
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 实际使用的提取几何
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractedRegion {
  /// 帧内的轴对齐裁剪框
  Cropped(BoundingBox),
  /// 单应性校正，`homography` 把 `side × side` 正方形映射到帧内四边形
  Warped {
    corners: Corners,
    homography: Homography,
    side: u32,
  },
}

/// 帧中央、边长为 `floor(min(w, h) * fraction)` 的正方形
pub fn centered_square(frame_width: usize, frame_height: usize, fraction: f64) -> BoundingBox {
  let side = ((frame_width.min(frame_height) as f64) * fraction).floor().max(0.0) as usize;
  let side = side.min(frame_width).min(frame_height);
  let x = (frame_width - side) / 2;
  let y = (frame_height - side) / 2;
  BoundingBox::new(x as u32, y as u32, side as u32, side as u32)
}

/// 角点的最小外接框，四周各加 `padding_ratio * max(w, h)` 的边距，不做裁剪。
/// 返回 `(x0, y0, x1, y1)`。
pub fn padded_extent(points: &[Point2D], padding_ratio: f64) -> Option<(f64, f64, f64, f64)> {
  let first = points.first()?;
  let (mut x0, mut y0, mut x1, mut y1) = (first.x, first.y, first.x, first.y);
  for p in &points[1..] {
    x0 = x0.min(p.x);
    y0 = y0.min(p.y);
    x1 = x1.max(p.x);
    y1 = y1.max(p.y);
  }
  let pad = (x1 - x0).max(y1 - y0) * padding_ratio;
  Some((x0 - pad, y0 - pad, x1 + pad, y1 + pad))
}

/// 轴对齐包围策略。
///
/// 少于 3 个角点时退化为帧中央的正方形。结果总在帧范围内。
pub fn bounding_region(
  points: &[Point2D],
  frame_width: usize,
  frame_height: usize,
  padding_ratio: f64,
  fallback_fraction: f64,
) -> BoundingBox {
  if points.len() < 3 {
    let square = centered_square(frame_width, frame_height, fallback_fraction);
    debug!("角点数量不足 ({}), 使用中央正方形 {:?}", points.len(), square);
    return square;
  }

  match padded_extent(points, padding_ratio) {
    Some((x0, y0, x1, y1)) => {
      BoundingBox::from_extent_clamped(x0, y0, x1, y1, frame_width, frame_height)
    }
    None => centered_square(frame_width, frame_height, fallback_fraction),
  }
}

/// 按策略从帧中提取 QR 区域，返回新分配的裁剪图像与所用几何。
///
/// 透视策略需要能组成四边形的角点，否则退回包围策略。
pub fn extract(
  frame: &RgbaFrame,
  points: &[Point2D],
  strategy: ExtractStrategy,
  padding_ratio: f64,
  fallback_fraction: f64,
) -> Result<(RgbaFrame, ExtractedRegion), RegionError> {
  if let ExtractStrategy::Perspective { side } = strategy
    && let Some(corners) = Corners::from_slice(points)
  {
    let homography = Homography::from_square(&corners, side);
    let crop = warp_square(frame, &homography, side);
    info!("透视校正提取: 边长 {}", side);
    return Ok((
      crop,
      ExtractedRegion::Warped {
        corners,
        homography,
        side,
      },
    ));
  }

  let region = bounding_region(
    points,
    frame.width(),
    frame.height(),
    padding_ratio,
    fallback_fraction,
  );
  if region.is_empty() {
    return Err(RegionError::EmptyRegion(region));
  }
  let crop = frame.crop(&region)?;
  info!(
    "包围框提取: x={} y={} w={} h={}",
    region.x, region.y, region.w, region.h
  );
  Ok((crop, ExtractedRegion::Cropped(region)))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn square_points(x0: f64, y0: f64, x1: f64, y1: f64) -> Vec<Point2D> {
    vec![
      Point2D::new(x0, y0),
      Point2D::new(x1, y0),
      Point2D::new(x1, y1),
      Point2D::new(x0, y1),
    ]
  }

  #[test]
  fn padded_box_matches_expected_geometry() {
    let points = square_points(400.0, 400.0, 600.0, 600.0);
    let region = bounding_region(&points, 1000, 1000, 0.05, 0.5);
    assert_eq!(region, BoundingBox::new(390, 390, 220, 220));
  }

  #[test]
  fn padded_box_is_clamped_near_edges() {
    let points = square_points(-20.0, 5.0, 180.0, 150.0);
    let region = bounding_region(&points, 160, 120, 0.15, 0.5);
    assert!(region.fits_within(160, 120));
    assert_eq!(region.x, 0);
    assert_eq!(region.y, 0);
    assert_eq!(region.right(), 160);
    assert_eq!(region.bottom(), 120);
  }

  #[test]
  fn too_few_points_fall_back_to_centered_square() {
    let points = [Point2D::new(10.0, 10.0), Point2D::new(90.0, 10.0)];
    let region = bounding_region(&points, 640, 480, 0.05, 0.5);
    assert_eq!(region, BoundingBox::new(200, 120, 240, 240));
  }

  #[test]
  fn three_points_use_min_max_extent() {
    let points = [
      Point2D::new(100.0, 100.0),
      Point2D::new(200.0, 100.0),
      Point2D::new(100.0, 200.0),
    ];
    let region = bounding_region(&points, 400, 400, 0.0, 0.5);
    assert_eq!(region, BoundingBox::new(100, 100, 100, 100));
  }

  #[test]
  fn perspective_strategy_produces_square_crop() {
    let frame = RgbaFrame::filled(100, 80, [30, 30, 30, 255]);
    let points = square_points(20.0, 10.0, 60.0, 50.0);
    let (crop, region) = extract(
      &frame,
      &points,
      ExtractStrategy::Perspective { side: 64 },
      0.05,
      0.5,
    )
    .unwrap();
    assert_eq!((crop.width(), crop.height()), (64, 64));
    assert!(matches!(region, ExtractedRegion::Warped { side: 64, .. }));
    assert_eq!(crop.pixel(32, 32), [30, 30, 30, 255]);
  }

  #[test]
  fn perspective_without_corners_falls_back_to_bounding() {
    let frame = RgbaFrame::filled(100, 100, [0, 0, 0, 255]);
    let (crop, region) = extract(
      &frame,
      &[],
      ExtractStrategy::Perspective { side: 64 },
      0.05,
      0.5,
    )
    .unwrap();
    assert_eq!(region, ExtractedRegion::Cropped(BoundingBox::new(25, 25, 50, 50)));
    assert_eq!((crop.width(), crop.height()), (50, 50));
  }

  #[test]
  fn empty_region_is_an_error() {
    let frame = RgbaFrame::filled(1, 1, [0, 0, 0, 255]);
    let result = extract(&frame, &[], ExtractStrategy::Bounding, 0.05, 0.5);
    assert!(matches!(result, Err(RegionError::EmptyRegion(_))));
  }
}
