// 该文件是 Jianma （鉴码） 项目的一部分。
// src/output/draw.rs - 采集结果可视化
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

use image::{Rgba, RgbaImage};
use imageproc::drawing::draw_line_segment_mut;

use crate::{
  capture::CaptureArtifacts,
  frame::RgbaFrame,
  geometry::Point2D,
  region::ExtractedRegion,
};

const REGION_COLOR: [u8; 4] = [0, 255, 0, 255]; // 绿色
const PATCH_COLOR: [u8; 4] = [255, 0, 0, 255]; // 红色
const LINE_THICKNESS: u32 = 2;

pub struct Draw {
  region_color: [u8; 4],
  patch_color: [u8; 4],
  thickness: u32,
}

impl Default for Draw {
  fn default() -> Self {
    Self {
      region_color: REGION_COLOR,
      patch_color: PATCH_COLOR,
      thickness: LINE_THICKNESS,
    }
  }
}

/// 提取区域在帧中的四边形轮廓
pub fn region_outline(region: &ExtractedRegion) -> [Point2D; 4] {
  match region {
    ExtractedRegion::Cropped(b) => {
      let (x0, y0) = (b.x as f64, b.y as f64);
      let (x1, y1) = (b.right() as f64, b.bottom() as f64);
      [
        Point2D::new(x0, y0),
        Point2D::new(x1, y0),
        Point2D::new(x1, y1),
        Point2D::new(x0, y1),
      ]
    }
    ExtractedRegion::Warped { corners, .. } => corners.to_array(),
  }
}

/// 中心块在帧中的四边形轮廓。
///
/// 中心块坐标相对于（可能被外部增强缩放过的）QR 裁剪，先按比例换回
/// 提取坐标，再映射到帧坐标。
pub fn patch_outline(result: &CaptureArtifacts) -> Option<[Point2D; 4]> {
  let (qw, qh) = (result.qr_crop.width() as f64, result.qr_crop.height() as f64);
  if qw == 0.0 || qh == 0.0 {
    return None;
  }
  let p = &result.patch_region;
  let local = [
    (p.x as f64, p.y as f64),
    (p.right() as f64, p.y as f64),
    (p.right() as f64, p.bottom() as f64),
    (p.x as f64, p.bottom() as f64),
  ];

  let mut outline = [Point2D::default(); 4];
  for (dst, (lx, ly)) in outline.iter_mut().zip(local) {
    *dst = match &result.region {
      ExtractedRegion::Cropped(b) => Point2D::new(
        b.x as f64 + lx * b.w as f64 / qw,
        b.y as f64 + ly * b.h as f64 / qh,
      ),
      ExtractedRegion::Warped {
        homography, side, ..
      } => {
        let scale = *side as f64;
        homography.map(&Point2D::new(lx * scale / qw, ly * scale / qh))?
      }
    };
  }
  Some(outline)
}

impl Draw {
  fn draw_polygon(&self, image: &mut RgbaImage, points: &[Point2D; 4], color: [u8; 4]) {
    for i in 0..points.len() {
      let a = points[i];
      let b = points[(i + 1) % points.len()];
      for t in 0..self.thickness {
        let o = t as f32;
        draw_line_segment_mut(
          image,
          (a.x as f32 + o, a.y as f32 + o),
          (b.x as f32 + o, b.y as f32 + o),
          Rgba(color),
        );
      }
    }
  }

  /// 在提交帧上画出提取区域与中心块
  pub fn draw_capture(&self, frame: &RgbaFrame, result: &CaptureArtifacts) -> RgbaImage {
    let mut image = frame.to_rgba_image();
    self.draw_polygon(&mut image, &region_outline(&result.region), self.region_color);
    if let Some(patch) = patch_outline(result) {
      self.draw_polygon(&mut image, &patch, self.patch_color);
    }
    image
  }
}
