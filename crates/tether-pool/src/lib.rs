#![doc = r#"
# tether-pool

## 设计动机（Why）
- **定位**：在重复的客户端请求之间摊销建连成本。固定容量的连接池
  复用空闲连接、按上限开新连接，并在耗尽时按配置阻塞或快速失败。
- **架构角色**：[`ConnectionSource`] 是“取得一条可用连接”的能力契约，
  池只是其中一种实现；直连实现 [`DirectSource`] 服务于不值得池化的
  低频场景。
- **设计理念**：连接的成员关系（空闲/出借）是池内唯一被多任务修改的
  状态，全部迁移都在同一把锁内完成；出借是排他的，同一连接绝不会
  同时交给两个调用方。

## 核心契约（What）
- `get` / `get_host` / `get_to`：返回 [`PooledConnection`]；非阻塞池在
  耗尽时以 [`ErrorKind::PoolExhausted`](tether_core::ErrorKind) 返回，
  阻塞池挂起调用方直至有连接被释放或取得截止；
- `release`：归还连接并记录时间戳；死连接不回池；
- `discard`：调用方观察到致命传输错误后关闭并腾出容量；
- 不变量：`空闲数 + 出借数 ≤ 容量` 恒成立。

## 实现策略（How）
- 成员状态置于一把同步互斥锁后，锁内从不等待 IO：新连接的建立发生
  在锁外，容量配额则在锁内先行预留，两个任务不可能认领同一配额；
- 逐出策略为“最久空闲优先”；空闲超时在每次取用时顺带清扫；
- 阻塞取用以 `Notify` 等待释放事件，并以有界轮询规避唤醒竞争。

## 风险与考量（Trade-offs）
- 空闲匹配是 O(容量) 的线性扫描；池的预期规模是数十而非数千，换取
  实现与锁粒度的简单；
- 忘记归还的连接由析构兜底关闭并腾出容量，但这属于调用方缺陷，
  池会以日志告警。
"#]

mod config;
mod error;
mod pool;
mod source;

pub use config::{PoolConfig, PoolConfigBuilder};
pub use pool::{FixedConnectionPool, PooledConnection};
pub use source::{ConnectionSource, Connector, DirectSource, TcpConnector};
