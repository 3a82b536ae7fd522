// 该文件是 Jianma （鉴码） 项目的一部分。
// src/config.rs - 采集流水线配置
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

use crate::{
  enhance::EnhanceParams,
  stability::{DEFAULT_POSITION_TOL_PX, DEFAULT_SIZE_TOL_RATIO, DEFAULT_STABILITY_FRAMES},
};

pub const DEFAULT_CENTER_FRACTION: f64 = 0.4;
pub const DEFAULT_PADDING_RATIO: f64 = 0.05;
pub const DEFAULT_FALLBACK_FRACTION: f64 = 0.5;
pub const DEFAULT_WARP_SIDE: u32 = 512;
pub const DEFAULT_DECODE_MAX_DIMENSION: u32 = 1024;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
  #[error("参数 {name} 超出范围: {value} (允许 {range})")]
  OutOfRange {
    name: &'static str,
    value: f64,
    range: &'static str,
  },
  #[error("稳定窗口至少需要 1 帧")]
  EmptyStabilityWindow,
  #[error("透视校正边长不能为 0")]
  ZeroWarpSide,
}

/// 区域提取方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExtractStrategy {
  /// 轴对齐包围框加边距后直接裁剪
  #[default]
  Bounding,
  /// 单应性校正到 `side × side` 的正方形
  Perspective { side: u32 },
}

/// 采集会话的全部可调参数
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
  /// CDP 边长相对 QR 裁剪短边的比例
  pub center_fraction: f64,
  /// 裁剪边距相对检测框长边的比例
  pub padding_ratio: f64,
  /// 角点不足时，居中正方形边长相对帧短边的比例
  pub fallback_fraction: f64,
  pub stability_enabled: bool,
  pub stability_frames: usize,
  pub position_tol_px: f64,
  pub size_tol_ratio: f64,
  pub strategy: ExtractStrategy,
  pub qr_enhance: Option<EnhanceParams>,
  pub patch_enhance: Option<EnhanceParams>,
  /// 锁定后的提取失败时是否回到扫描状态
  pub retry_on_failure: bool,
  /// 解码前缩放到的最大边长，0 表示不缩放
  pub decode_max_dimension: u32,
}

impl Default for CaptureConfig {
  fn default() -> Self {
    Self {
      center_fraction: DEFAULT_CENTER_FRACTION,
      padding_ratio: DEFAULT_PADDING_RATIO,
      fallback_fraction: DEFAULT_FALLBACK_FRACTION,
      stability_enabled: true,
      stability_frames: DEFAULT_STABILITY_FRAMES,
      position_tol_px: DEFAULT_POSITION_TOL_PX,
      size_tol_ratio: DEFAULT_SIZE_TOL_RATIO,
      strategy: ExtractStrategy::default(),
      qr_enhance: None,
      patch_enhance: None,
      retry_on_failure: false,
      decode_max_dimension: DEFAULT_DECODE_MAX_DIMENSION,
    }
  }
}

fn check_range(
  name: &'static str,
  value: f64,
  ok: bool,
  range: &'static str,
) -> Result<(), ConfigError> {
  if ok {
    Ok(())
  } else {
    Err(ConfigError::OutOfRange { name, value, range })
  }
}

impl CaptureConfig {
  pub fn validate(&self) -> Result<(), ConfigError> {
    check_range(
      "center_fraction",
      self.center_fraction,
      self.center_fraction > 0.0 && self.center_fraction <= 1.0,
      "(0, 1]",
    )?;
    check_range(
      "padding_ratio",
      self.padding_ratio,
      (0.0..=1.0).contains(&self.padding_ratio),
      "[0, 1]",
    )?;
    check_range(
      "fallback_fraction",
      self.fallback_fraction,
      self.fallback_fraction > 0.0 && self.fallback_fraction <= 1.0,
      "(0, 1]",
    )?;
    check_range(
      "position_tol_px",
      self.position_tol_px,
      self.position_tol_px >= 0.0,
      "[0, ∞)",
    )?;
    check_range(
      "size_tol_ratio",
      self.size_tol_ratio,
      self.size_tol_ratio >= 0.0,
      "[0, ∞)",
    )?;
    if self.stability_frames == 0 {
      return Err(ConfigError::EmptyStabilityWindow);
    }
    if let ExtractStrategy::Perspective { side: 0 } = self.strategy {
      return Err(ConfigError::ZeroWarpSide);
    }
    for params in [self.qr_enhance, self.patch_enhance].iter().flatten() {
      check_range(
        "contrast",
        params.contrast as f64,
        params.contrast >= 0.0,
        "[0, ∞)",
      )?;
    }
    Ok(())
  }
}
