use std;
use trackable;
use trackable::error::ErrorKindExt;

/// crate固有のエラー型.
#[derive(Debug, Clone, TrackableError)]
pub struct Error(trackable::error::TrackableError<ErrorKind>);
impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        if let Some(e) = e.get_ref().and_then(|e| e.downcast_ref::<Error>()).cloned() {
            e
        } else if e.kind() == std::io::ErrorKind::InvalidInput {
            ErrorKind::InvalidInput.cause(e).into()
        } else {
            ErrorKind::Other.cause(e).into()
        }
    }
}
impl From<Error> for std::io::Error {
    fn from(e: Error) -> Self {
        if *e.kind() == ErrorKind::InvalidInput {
            std::io::Error::new(std::io::ErrorKind::InvalidInput, e)
        } else {
            std::io::Error::new(std::io::ErrorKind::Other, e)
        }
    }
}
impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ErrorKind::Other.cause(e.to_string()).into()
    }
}

/// 発生し得るエラーの種別.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// アリーナの容量が不正 (i.e., `0`).
    ///
    /// アリーナの構築時にのみ返され、その場合アリーナは生成されない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して、正の容量を指定する
    InvalidCapacity,

    /// 指定された容量で、アリーナの実体(バッキングストア)を用意できなかった.
    ///
    /// E.g., メモリの確保に失敗した、ファイルの領域確保に失敗した、
    /// 指定された容量がバッキングストアの容量を超えている
    ///
    /// # 典型的な対応策
    ///
    /// - より小さな容量で構築し直す
    /// - バッキングストアの側の空き容量を増やす
    ArenaCreationFailed,

    /// 要求サイズを満たす空き領域が存在しない.
    ///
    /// アリーナが拡張されることはなく、内部でリトライが行われることもない.
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者が不要な領域を解放した上で、リトライする
    /// - 上位の操作を失敗させる
    OutOfMemory,

    /// 割当済みの領域に対応しないハンドルが指定された.
    ///
    /// E.g., 二重解放、解放済みのハンドルの使用、別のアリーナが発行したハンドルの使用
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して、ハンドルを一度だけ解放するようにする
    InvalidHandle,

    /// 割当要求のサイズが不正 (i.e., `0`).
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して、空のペイロードの割当を行わないようにする
    InvalidSize,

    /// 入力が不正.
    ///
    /// E.g., バッキングストアの容量を超える範囲への読み書き
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側のプログラムを修正して入力を正しくする
    InvalidInput,

    /// 内部状態が不整合に陥っている.
    ///
    /// プログラムにバグがあることを示している.
    ///
    /// # 典型的な対応策
    ///
    /// - バグ修正を行ってプログラムを更新する
    InconsistentState,

    /// その他エラー.
    ///
    /// E.g., I/Oエラー
    ///
    /// # 典型的な対応策
    ///
    /// - 利用者側で（指数バックオフ等を挟みつつ）何度かリトライ
    ///   - それでもダメなら、致命的な異常が発生していると判断
    Other,
}
impl trackable::error::ErrorKind for ErrorKind {}
