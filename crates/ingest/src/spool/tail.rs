//! 스풀 꼬리에서 마지막 시퀀스 복구
//!
//! 파일 끝에서 최대 64 KiB만 읽어 마지막 완전한 레코드의 선두
//! 탭 구분 정수를 파싱합니다.

use std::io::SeekFrom;
use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::error::IngestError;

/// 꼬리에서 읽는 최대 바이트 수
const MAX_TAIL_BYTES: u64 = 64 * 1024;

/// 스풀 파일 꼬리에서 마지막 시퀀스를 읽습니다.
///
/// 파일이 없거나 비어 있거나 마지막 레코드가 손상된 경우 에러를
/// 반환합니다. 호출자는 에러를 0으로 취급합니다.
pub async fn read_last_seq(path: &Path) -> Result<i64, IngestError> {
    let spool_err = |reason: String| IngestError::Spool {
        tenant_id: path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        reason,
    };

    let mut file = File::open(path)
        .await
        .map_err(|e| spool_err(format!("open: {e}")))?;
    let size = file
        .metadata()
        .await
        .map_err(|e| spool_err(format!("stat: {e}")))?
        .len();
    if size == 0 {
        return Err(spool_err("empty spool".to_owned()));
    }

    let start = size.saturating_sub(MAX_TAIL_BYTES);
    file.seek(SeekFrom::Start(start))
        .await
        .map_err(|e| spool_err(format!("seek: {e}")))?;

    let mut tail = Vec::with_capacity((size - start) as usize);
    file.read_to_end(&mut tail)
        .await
        .map_err(|e| spool_err(format!("read: {e}")))?;

    let text = String::from_utf8_lossy(&tail);
    let text = text.trim_end_matches(['\r', '\n']);
    if text.is_empty() {
        return Err(spool_err("no lines".to_owned()));
    }

    let last = match text.rfind('\n') {
        Some(idx) => &text[idx + 1..],
        None => text,
    };

    let tab = last
        .find('\t')
        .filter(|&idx| idx > 0)
        .ok_or_else(|| spool_err(format!("bad spool line: {last:.40}")))?;

    last[..tab]
        .parse::<i64>()
        .map_err(|e| spool_err(format!("bad seq prefix: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_spool(content: &[u8]) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenant.log");
        tokio::fs::write(&path, content).await.unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn reads_single_record() {
        let (_dir, path) = write_spool(b"7\tsome line\n").await;
        assert_eq!(read_last_seq(&path).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn reads_last_of_many_records() {
        let (_dir, path) = write_spool(b"1\ta\n2\tb\n3\tc\n").await;
        assert_eq!(read_last_seq(&path).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn tolerates_missing_trailing_newline() {
        let (_dir, path) = write_spool(b"1\ta\n2\tb").await;
        assert_eq!(read_last_seq(&path).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn empty_file_is_an_error() {
        let (_dir, path) = write_spool(b"").await;
        assert!(read_last_seq(&path).await.is_err());
    }

    #[tokio::test]
    async fn missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_last_seq(&dir.path().join("absent.log")).await.is_err());
    }

    #[tokio::test]
    async fn record_without_tab_is_an_error() {
        let (_dir, path) = write_spool(b"no-tab-here\n").await;
        assert!(read_last_seq(&path).await.is_err());
    }

    #[tokio::test]
    async fn record_with_leading_tab_is_an_error() {
        let (_dir, path) = write_spool(b"\t5\tline\n").await;
        assert!(read_last_seq(&path).await.is_err());
    }

    #[tokio::test]
    async fn only_tail_window_is_scanned() {
        // 64 KiB보다 큰 파일에서도 마지막 레코드를 찾는다
        let mut content = Vec::new();
        for i in 1..=5000i64 {
            content.extend_from_slice(format!("{i}\tpadding padding padding padding\n").as_bytes());
        }
        let (_dir, path) = write_spool(&content).await;
        assert_eq!(read_last_seq(&path).await.unwrap(), 5000);
    }
}
