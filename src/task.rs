// 该文件是 Jianma （鉴码） 项目的一部分。
// src/task.rs - 采集任务循环
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

use std::{thread, time::Duration};
use tracing::{debug, info, warn};

use crate::{
  capture::{CaptureArtifacts, CaptureSession, FrameOutcome},
  detect::SymbolDecoder,
  enhance::{ExternalEnhancer, ResizeEnhancer},
  frame::RgbaFrame,
  output::Render,
};

pub trait Task<I, S, O>: Sized {
  type Error;
  fn run_task(
    self,
    input: I,
    session: S,
    output: O,
  ) -> Result<Option<CaptureArtifacts>, Self::Error>;
}

/// 持续从输入读取帧，直到完成一次采集、输入耗尽、达到帧数上限或收到 Ctrl-C。
///
/// 设置了外部增强器时，提交后的裁剪先交给增强器，再完成采集。
#[derive(Debug)]
pub struct ContinuousTask<E = ResizeEnhancer> {
  frame_number: Option<usize>,
  enhancer: Option<E>,
}

impl ContinuousTask {
  pub fn new() -> Self {
    Self {
      frame_number: None,
      enhancer: None,
    }
  }
}

impl Default for ContinuousTask {
  fn default() -> Self {
    Self::new()
  }
}

impl<E> ContinuousTask<E> {
  pub fn with_frame_number(mut self, frame_number: Option<usize>) -> Self {
    self.frame_number = frame_number;
    self
  }

  pub fn with_enhancer<F: ExternalEnhancer>(self, enhancer: Option<F>) -> ContinuousTask<F> {
    ContinuousTask {
      frame_number: self.frame_number,
      enhancer,
    }
  }
}

impl<
  D: SymbolDecoder,
  E: ExternalEnhancer,
  RE: std::error::Error + Sync + Send + 'static,
  I: Iterator<Item = RgbaFrame>,
  O: Render<RgbaFrame, CaptureArtifacts, Error = RE>,
> Task<I, CaptureSession<D>, O> for ContinuousTask<E>
{
  type Error = anyhow::Error;

  fn run_task(
    self,
    input: I,
    mut session: CaptureSession<D>,
    output: O,
  ) -> Result<Option<CaptureArtifacts>, Self::Error> {
    info!("开始任务...");
    let (tx, rx) = std::sync::mpsc::channel();

    if let Err(e) = ctrlc::set_handler(move || {
      info!("收到中断信号，准备退出...");
      let _ = tx.send(());
      thread::spawn(|| {
        thread::sleep(Duration::from_secs(30));
        warn!("强制退出程序");
        std::process::exit(1);
      });
    }) {
      warn!("无法注册 Ctrl-C 处理函数: {}", e);
    }

    session.start();
    let mut frame_index = 0usize;
    let started = std::time::Instant::now();
    for frame in input {
      frame_index = frame_index.wrapping_add(1);
      debug!("处理第 {} 帧图像", frame_index);

      let pending = match session.on_frame(&frame) {
        FrameOutcome::Committed(pending) => Some(pending),
        FrameOutcome::Failed(e) if session.is_finished() => return Err(e.into()),
        FrameOutcome::Failed(e) => {
          warn!("第 {} 帧提取失败，继续扫描: {}", frame_index, e);
          None
        }
        FrameOutcome::Unstable { samples, required } => {
          debug!("等待稳定: {}/{}", samples, required);
          None
        }
        FrameOutcome::NoDetection | FrameOutcome::NotReady | FrameOutcome::Ignored => None,
      };

      if let Some(pending) = pending {
        let result = match &self.enhancer {
          Some(enhancer) => pollster::block_on(session.complete_with(pending, enhancer)),
          None => session.complete(pending),
        };
        match result {
          Ok(artifacts) => {
            output.render_result(&frame, &artifacts)?;
            info!(
              "采集完成，共处理 {} 帧，耗时: {:.2?}，释放输入源",
              frame_index,
              started.elapsed()
            );
            return Ok(Some(artifacts));
          }
          Err(e) if session.is_finished() => return Err(e.into()),
          Err(e) => warn!("采集未完成，继续扫描: {}", e),
        }
      }

      if self.frame_number.map(|n| frame_index >= n).unwrap_or(false) {
        info!("达到指定帧数 {}, 退出任务循环", frame_index);
        break;
      }
      if rx.try_recv().is_ok() {
        warn!("中断信号接收，退出任务循环");
        break;
      }
    }

    session.reset();
    info!("任务结束，未完成采集");
    Ok(None)
  }
}
