// 该文件是 Yunjing （云镜） 项目的一部分。
// src/task.rs - 批量推理策略
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

use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuildError, ThreadPoolBuilder, prelude::*};
use tracing::{debug, info, warn};

use crate::model::Model;

/// 对一批输入逐个推理。输出与输入一一对应、保持顺序；
/// 任一输入失败则整批失败，不返回部分结果。
pub trait BatchStrategy {
  fn run_batch<M>(&self, model: &M, inputs: &[M::Input]) -> Result<Vec<M::Output>, M::Error>
  where
    M: Model + Sync,
    M::Input: Sync,
    M::Output: Send,
    M::Error: Send;
}

/// 顺序执行，每次只有一个请求在途
#[derive(Debug, Default, Clone, Copy)]
pub struct SequentialBatch;

impl BatchStrategy for SequentialBatch {
  fn run_batch<M>(&self, model: &M, inputs: &[M::Input]) -> Result<Vec<M::Output>, M::Error>
  where
    M: Model + Sync,
    M::Input: Sync,
    M::Output: Send,
    M::Error: Send,
  {
    info!("顺序处理 {} 个输入", inputs.len());
    let mut outputs = Vec::with_capacity(inputs.len());
    for (idx, input) in inputs.iter().enumerate() {
      let now = Instant::now();
      outputs.push(model.infer(input)?);
      debug!("({})推理完成，耗时: {:.2?}", idx, now.elapsed());
    }
    Ok(outputs)
  }
}

/// 最多 `workers` 个线程并发请求，线程池在构造时创建并复用
#[derive(Debug)]
pub struct BoundedParallelBatch {
  workers: usize,
  pool: ThreadPool,
}

impl BoundedParallelBatch {
  pub fn new(workers: usize) -> Result<Self, ThreadPoolBuildError> {
    if workers == 0 {
      warn!("工作线程数为 0，按 1 处理");
    }
    let workers = workers.max(1);
    let pool = ThreadPoolBuilder::new()
      .num_threads(workers)
      .thread_name(|i| format!("yunjing-batch-{}", i))
      .build()?;
    Ok(Self { workers, pool })
  }

  pub fn workers(&self) -> usize {
    self.workers
  }
}

impl BatchStrategy for BoundedParallelBatch {
  fn run_batch<M>(&self, model: &M, inputs: &[M::Input]) -> Result<Vec<M::Output>, M::Error>
  where
    M: Model + Sync,
    M::Input: Sync,
    M::Output: Send,
    M::Error: Send,
  {
    if self.workers <= 1 || inputs.len() <= 1 {
      return SequentialBatch.run_batch(model, inputs);
    }

    info!("并发处理 {} 个输入，工作线程 {} 个", inputs.len(), self.workers);
    // 按输入顺序收集；任一失败时剩余任务不再启动
    self.pool.install(|| {
      inputs
        .par_iter()
        .enumerate()
        .map(|(idx, input)| {
          let now = Instant::now();
          let result = model.infer(input);
          match &result {
            Ok(_) => debug!("({})推理完成，耗时: {:.2?}", idx, now.elapsed()),
            Err(_) => warn!("第 {} 个输入推理失败，放弃整批结果", idx),
          }
          result
        })
        .collect::<Result<Vec<_>, _>>()
    })
  }
}
