// 该文件是 Jianma （鉴码） 项目的一部分。
// src/detect.rs - QR 检测适配器
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

//! 外部 QR 解码器的适配层。
//!
//! 解码器可能返回两种形态的结果：带角点访问器的“富”结果，
//! 以及只有原始坐标字段的“朴素”结果。两者都在 [`coerce_points`]
//! 中统一为 [`Point2D`] 序列，流水线内部只看到 [`Detection`]。
//! 解码器的错误与 panic 都被吞掉并记为“未检测到”。

use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::{
  frame::RgbaFrame,
  geometry::{BoundingBox, Corners, Point2D},
};

/// 解码器给出的原始符号
pub trait RawSymbol {
  fn text(&self) -> &str;

  /// 富结果：直接给出四个角点（左上、右上、右下、左下）
  fn corner_accessor(&self) -> Option<[Point2D; 4]> {
    None
  }

  /// 朴素结果：原始坐标字段，可能只有三个定位点
  fn raw_points(&self) -> &[Point2D] {
    &[]
  }
}

/// 外部 QR 解码能力
pub trait SymbolDecoder {
  type Symbol: RawSymbol;
  type Error: std::error::Error;

  fn decode(&self, pixels: &RgbaFrame) -> Result<Option<Self::Symbol>, Self::Error>;
}

/// 归一化后的检测结果
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
  pub text: String,
  /// 能组成四边形时为四个角点，否则为解码器给出的原始点
  pub points: Vec<Point2D>,
}

impl Detection {
  pub fn corners(&self) -> Option<Corners> {
    Corners::from_slice(&self.points)
  }

  pub fn translate(mut self, dx: f64, dy: f64) -> Self {
    for p in self.points.iter_mut() {
      *p = p.translate(dx, dy);
    }
    self
  }
}

/// 先尝试访问器，再回退到原始字段；三点结果按平行四边形补全。
pub fn coerce_points<S: RawSymbol + ?Sized>(symbol: &S) -> Vec<Point2D> {
  if let Some(corners) = symbol.corner_accessor() {
    return corners.to_vec();
  }

  let raw = symbol.raw_points();
  match Corners::from_slice(raw) {
    Some(corners) => corners.to_array().to_vec(),
    None => raw.to_vec(),
  }
}

/// 朴素结果：文本加坐标数组
#[derive(Debug, Clone, PartialEq)]
pub struct PlainSymbol {
  pub text: String,
  pub points: Vec<Point2D>,
}

impl RawSymbol for PlainSymbol {
  fn text(&self) -> &str {
    &self.text
  }

  fn raw_points(&self) -> &[Point2D] {
    &self.points
  }
}

/// 检测适配器：包装解码器，保证不向上抛出错误
pub struct Detector<D> {
  decoder: D,
}

impl<D: SymbolDecoder> Detector<D> {
  pub fn new(decoder: D) -> Self {
    Self { decoder }
  }

  pub fn decoder(&self) -> &D {
    &self.decoder
  }

  pub fn detect(&self, pixels: &RgbaFrame) -> Option<Detection> {
    if pixels.is_empty() {
      return None;
    }

    let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.decoder.decode(pixels)));
    let symbol = match outcome {
      Ok(Ok(Some(symbol))) => symbol,
      Ok(Ok(None)) => {
        trace!("未检测到 QR 码");
        return None;
      }
      Ok(Err(e)) => {
        debug!("解码失败: {}", e);
        return None;
      }
      Err(_) => {
        warn!("解码器发生 panic，按未检测处理");
        return None;
      }
    };

    let detection = Detection {
      text: symbol.text().to_string(),
      points: coerce_points(&symbol),
    };
    debug!(
      "检测到 QR 码: {:?}, 角点数量 {}",
      detection.text,
      detection.points.len()
    );
    Some(detection)
  }

  /// 只在帧内某个区域中检测，角点换算回帧坐标
  pub fn detect_region(&self, frame: &RgbaFrame, region: &BoundingBox) -> Option<Detection> {
    let roi = match frame.crop(region) {
      Ok(roi) => roi,
      Err(e) => {
        debug!("感兴趣区域无效: {}", e);
        return None;
      }
    };
    self
      .detect(&roi)
      .map(|d| d.translate(region.x as f64, region.y as f64))
  }
}

#[derive(Error, Debug)]
pub enum RqrrDecodeError {
  #[error("QR 解码错误: {0}")]
  DecodeError(#[from] rqrr::DeQRError),
}

/// rqrr 的解码结果，角点取自网格边界
#[derive(Debug, Clone)]
pub struct RqrrSymbol {
  text: String,
  bounds: [Point2D; 4],
}

impl RawSymbol for RqrrSymbol {
  fn text(&self) -> &str {
    &self.text
  }

  fn corner_accessor(&self) -> Option<[Point2D; 4]> {
    Some(self.bounds)
  }
}

/// 基于 rqrr 的解码器。大图先缩放到 `max_dimension` 再检测，角点按比例还原。
#[derive(Debug, Clone)]
pub struct RqrrDecoder {
  max_dimension: u32,
}

impl Default for RqrrDecoder {
  fn default() -> Self {
    Self::with_max_dimension(crate::config::DEFAULT_DECODE_MAX_DIMENSION)
  }
}

impl RqrrDecoder {
  /// `max_dimension` 为 0 时不缩放
  pub fn with_max_dimension(max_dimension: u32) -> Self {
    Self { max_dimension }
  }

  fn scale_for(&self, width: usize, height: usize) -> f64 {
    let longest = width.max(height) as f64;
    if self.max_dimension == 0 || longest <= self.max_dimension as f64 {
      1.0
    } else {
      longest / self.max_dimension as f64
    }
  }
}

impl SymbolDecoder for RqrrDecoder {
  type Symbol = RqrrSymbol;
  type Error = RqrrDecodeError;

  fn decode(&self, pixels: &RgbaFrame) -> Result<Option<Self::Symbol>, Self::Error> {
    if pixels.is_empty() {
      return Ok(None);
    }
    let scale = self.scale_for(pixels.width(), pixels.height());
    let width = ((pixels.width() as f64 / scale) as usize).max(1);
    let height = ((pixels.height() as f64 / scale) as usize).max(1);
    let max_x = pixels.width() - 1;
    let max_y = pixels.height() - 1;

    let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(width, height, |x, y| {
      let sx = ((x as f64 * scale) as usize).min(max_x);
      let sy = ((y as f64 * scale) as usize).min(max_y);
      pixels.luma(sx, sy)
    });
    let grids = prepared.detect_grids();
    trace!("rqrr 网格数量: {}", grids.len());

    let mut last_error = None;
    for grid in grids {
      match grid.decode() {
        Ok((_meta, text)) => {
          let bounds = grid
            .bounds
            .map(|p| Point2D::new(p.x as f64 * scale, p.y as f64 * scale));
          return Ok(Some(RqrrSymbol { text, bounds }));
        }
        Err(e) => last_error = Some(e),
      }
    }

    match last_error {
      Some(e) => Err(e.into()),
      None => Ok(None),
    }
  }
}
