//! 프레임 규율 -- 연결당 정확히 한 줄
//!
//! 750ms 유휴 read 데드라인으로 4 KiB 청크를 읽어 `max_line_bytes + 1`
//! 까지 수신합니다. 프레임은 정확히 하나의 LF로 끝나야 하며, LF가
//! 마지막 바이트가 아니거나 둘 이상이면 드롭됩니다. 말미의 `\r\n` 하나는
//! 허용됩니다. 유효하지 않은 UTF-8 바이트는 U+FFFD로 치환됩니다.

use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;

/// 연결당 유휴 read 데드라인
pub const IDLE_READ_TIMEOUT: Duration = Duration::from_millis(750);

/// read 청크 크기 (바이트)
const READ_CHUNK_SIZE: usize = 4096;

/// 프레임 읽기 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// 규율을 통과한 한 줄 (LF 제거, 트리밍 완료)
    Line(String),
    /// 빈 입력 (드롭 카운트 대상 아님)
    Empty,
    /// `max_line_bytes + 1` 초과
    TooBig,
    /// LF 규율 위반 (없음, 둘 이상, 또는 마지막 바이트가 아님)
    BadFraming,
}

/// 한 연결에서 한 프레임을 읽습니다.
///
/// 읽기는 유휴 타임아웃 또는 EOF에서 끝납니다. 타임아웃은 에러가 아니라
/// 입력 종료로 취급합니다 (클라이언트는 라인을 보내고 연결을 닫거나
/// 그대로 둘 수 있습니다).
pub async fn read_frame<R>(reader: &mut R, max_line_bytes: usize) -> std::io::Result<Frame>
where
    R: AsyncRead + Unpin,
{
    let limit = max_line_bytes + 1;
    let mut buf: Vec<u8> = Vec::with_capacity(limit.min(READ_CHUNK_SIZE));
    let mut chunk = [0u8; READ_CHUNK_SIZE];

    loop {
        match timeout(IDLE_READ_TIMEOUT, reader.read(&mut chunk)).await {
            // 유휴 데드라인 도달: 지금까지 읽은 것으로 판정
            Err(_) => break,
            Ok(Err(e)) => return Err(e),
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                if buf.len() + n > limit {
                    return Ok(Frame::TooBig);
                }
                buf.extend_from_slice(&chunk[..n]);
            }
        }
    }

    if buf.is_empty() {
        return Ok(Frame::Empty);
    }

    let lf_count = buf.iter().filter(|&&b| b == b'\n').count();
    if lf_count != 1 {
        return Ok(Frame::BadFraming);
    }
    if buf.last() != Some(&b'\n') {
        return Ok(Frame::BadFraming);
    }

    buf.pop();
    if buf.last() == Some(&b'\r') {
        buf.pop();
    }

    // 방어적 치환. 위의 규율 검사로 내부 개행은 이미 거부되었다.
    for b in &mut buf {
        if *b == b'\n' || *b == b'\r' {
            *b = b' ';
        }
    }

    let line = String::from_utf8_lossy(&buf).trim().to_owned();
    if line.is_empty() {
        return Ok(Frame::Empty);
    }
    Ok(Frame::Line(line))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncWriteExt;

    const MAX: usize = 16 * 1024;

    async fn frame_of(payload: &[u8]) -> Frame {
        let (mut client, mut server) = tokio::io::duplex(64 * 1024);
        client.write_all(payload).await.unwrap();
        drop(client); // EOF
        read_frame(&mut server, MAX).await.unwrap()
    }

    #[tokio::test]
    async fn accepts_single_line_with_lf() {
        let frame = frame_of(b"20240115.103005 - a1b2c3d4 - host > ls\n").await;
        assert_eq!(
            frame,
            Frame::Line("20240115.103005 - a1b2c3d4 - host > ls".to_owned())
        );
    }

    #[tokio::test]
    async fn tolerates_trailing_crlf() {
        let frame = frame_of(b"hello line\r\n").await;
        assert_eq!(frame, Frame::Line("hello line".to_owned()));
    }

    #[tokio::test]
    async fn rejects_missing_lf() {
        assert_eq!(frame_of(b"no newline here").await, Frame::BadFraming);
    }

    #[tokio::test]
    async fn rejects_two_lines_in_one_payload() {
        assert_eq!(frame_of(b"first\nsecond\n").await, Frame::BadFraming);
    }

    #[tokio::test]
    async fn rejects_lf_not_at_end() {
        assert_eq!(frame_of(b"first\nmore").await, Frame::BadFraming);
    }

    #[tokio::test]
    async fn rejects_oversize_frame() {
        // max+1을 초과하는 LF 없는 페이로드
        let big = vec![b'x'; MAX + 2];
        assert_eq!(frame_of(&big).await, Frame::TooBig);
    }

    #[tokio::test]
    async fn empty_input_is_empty() {
        assert_eq!(frame_of(b"").await, Frame::Empty);
        assert_eq!(frame_of(b"   \n").await, Frame::Empty);
    }

    #[tokio::test]
    async fn invalid_utf8_is_replaced() {
        let frame = frame_of(b"bad \xff\xfe bytes\n").await;
        match frame {
            Frame::Line(line) => {
                assert!(line.contains('\u{FFFD}'));
                assert!(line.starts_with("bad"));
            }
            other => panic!("expected line, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn idle_timeout_ends_read() {
        // 라인을 보내되 연결을 닫지 않음: 유휴 데드라인이 입력을 끝냄
        let (mut client, mut server) = tokio::io::duplex(1024);
        client.write_all(b"kept-open line\n").await.unwrap();
        let frame = read_frame(&mut server, MAX).await.unwrap();
        assert_eq!(frame, Frame::Line("kept-open line".to_owned()));
        drop(client);
    }
}
