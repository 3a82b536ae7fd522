// 该文件是 Jianma （鉴码） 项目的一部分。
// src/patch.rs - 中心数据块（CDP）采样
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
use tracing::debug;

use crate::{
  frame::{FrameError, RgbaFrame},
  geometry::BoundingBox,
};

#[derive(Error, Debug)]
pub enum PatchError {
  #[error("中心块尺寸为 0: 裁剪 {width}x{height}, 比例 {fraction}")]
  EmptyPatch {
    width: usize,
    height: usize,
    fraction: f64,
  },
  #[error("帧错误: {0}")]
  FrameError(#[from] FrameError),
}

/// 中心块在 QR 裁剪内的位置。
///
/// 边长为 `floor(min(W, H) * fraction)`，以 `(W/2, H/2)` 为中心，
/// 左上角被限制在裁剪范围内。
pub fn center_patch_region(width: usize, height: usize, fraction: f64) -> BoundingBox {
  let size = ((width.min(height) as f64) * fraction).floor().max(0.0) as usize;
  let size = size.min(width).min(height);

  let place = |extent: usize| -> usize {
    let start = (extent as f64 / 2.0 - size as f64 / 2.0).floor();
    let max_start = (extent - size) as f64;
    start.clamp(0.0, max_start) as usize
  };

  BoundingBox::new(
    place(width) as u32,
    place(height) as u32,
    size as u32,
    size as u32,
  )
}

/// 从 QR 裁剪中取出中心数据块，不做任何几何变换
pub fn sample_center_patch(
  crop: &RgbaFrame,
  fraction: f64,
) -> Result<(RgbaFrame, BoundingBox), PatchError> {
  let region = center_patch_region(crop.width(), crop.height(), fraction);
  if region.is_empty() {
    return Err(PatchError::EmptyPatch {
      width: crop.width(),
      height: crop.height(),
      fraction,
    });
  }

  let patch = crop.crop(&region)?;
  debug!(
    "中心块: {}x{} 位于 ({}, {})",
    region.w, region.h, region.x, region.y
  );
  Ok((patch, region))
}
