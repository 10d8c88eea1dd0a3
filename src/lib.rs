//! Region Arena.
//!
//! `regionarena`は、固定容量の線形領域(アリーナ)を、可変長かつ個別に解放可能な部分領域(region)群に
//! 切り分けるためのアロケータ.
//!
//! # 特徴
//!
//! - アリーナの容量は構築時に固定され、以後拡張されることはない
//! - 割当戦略は"BestFit"(要求サイズを満たす最小の空き領域を選択する)
//! - 解放時には、アドレス上で隣接する空き領域同士が常に結合される
//!   - そのため、隣り合う二つの空き領域、という状態は決して観測されない
//! - 割当結果は[`RegionHandle`]として返され、解放済みのハンドルの再利用は
//!   [`ErrorKind::InvalidHandle`]として検出される
//! - 割当の単位はバイトであり、それ以上のアライメントは考慮しない
//! - 内部で同期処理は行わない (単一のスレッドから操作されることを想定)
//!
//! # モジュールの依存関係
//!
//! ```text
//! arena => arena::allocator
//!       => store
//! ```
//!
//! - [arena]モジュール:
//!   - 主に[BufferArena]構造体を提供
//!   - `regionarena`の利用者が直接触るのはこの構造体
//!   - 割当の計算と、[store]へのペイロードの書き込み、を取りまとめる
//! - [arena::allocator]モジュール:
//!   - 主に[RegionAllocator]構造体を提供
//!   - 部分領域の計算処理のみを担当し、I/Oは一切行わない
//! - [store]モジュール:
//!   - 主に[BackingStore]トレイトとその実装群を提供
//!   - アリーナの実体となるバイト列(e.g., GPUのバッファオブジェクト)を抽象化する
//!
//! [`RegionHandle`]: ./arena/struct.RegionHandle.html
//! [`ErrorKind::InvalidHandle`]: ./enum.ErrorKind.html#variant.InvalidHandle
//! [arena]: ./arena/index.html
//! [BufferArena]: ./arena/struct.BufferArena.html
//! [arena::allocator]: ./arena/allocator/index.html
//! [RegionAllocator]: ./arena/allocator/struct.RegionAllocator.html
//! [store]: ./store/index.html
//! [BackingStore]: ./store/trait.BackingStore.html
#![warn(missing_docs)]
extern crate libc;
extern crate prometrics;
#[cfg(test)]
extern crate tempdir;
#[macro_use]
extern crate trackable;
extern crate uuid;
#[macro_use]
extern crate slog;

pub use crate::error::{Error, ErrorKind};

macro_rules! track_io {
    ($expr:expr) => {
        $expr.map_err(|e: ::std::io::Error| track!(crate::Error::from(e)))
    };
}

pub mod arena;
pub mod metrics;
pub mod store;

mod error;

/// crate固有の`Result`型.
pub type Result<T> = std::result::Result<T, Error>;
