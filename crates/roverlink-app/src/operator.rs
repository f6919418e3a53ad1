//! 콘솔 조작 명령.
//!
//! 표준 입력 한 줄을 [`Command`]로 해석해 세션에 전달한다.

use std::sync::Arc;

use roverlink_core::error::CoreError;
use roverlink_core::models::control::ControlVector;
use roverlink_session::session::TeleopSession;
use tracing::debug;

/// 조작 명령
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// 조이스틱 입력
    Move { lx: f32, ly: f32 },
    /// 조이스틱 놓음 (데드맨 정지)
    Release,
    VideoStart,
    VideoStop,
    Play(String),
    Speak(String),
    MicStart,
    MicStop,
    /// 오디오 전체 정지
    Stop,
    Status,
    Help,
    Quit,
}

/// 명령 해석 실패
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseError(pub String);

impl std::fmt::Display for ParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ('help'로 명령 목록 확인)", self.0)
    }
}

impl std::error::Error for ParseError {}

pub const HELP: &str = "\
명령:
  move <lx> <ly>     조이스틱 입력 (-1.0 ~ 1.0)
  release            조이스틱 놓기 (정지)
  video start|stop   영상 시작/종료
  play <ID>          차량 사운드 재생
  speak <TEXT>       차량 TTS
  mic start|stop     마이크 업링크 시작/종료
  stop               오디오 전체 정지
  status             현재 상태
  quit               종료";

impl Command {
    /// 한 줄 해석. 빈 줄은 `Ok(None)`
    pub fn parse(line: &str) -> Result<Option<Command>, ParseError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "move" | "m" => {
                let mut axes = rest.split_whitespace().map(str::parse::<f32>);
                match (axes.next(), axes.next(), axes.next()) {
                    (Some(Ok(lx)), Some(Ok(ly)), None) => Command::Move { lx, ly },
                    _ => return Err(ParseError(format!("move 인자 오류: '{rest}'"))),
                }
            }
            "release" | "r" => Command::Release,
            "video" => match rest {
                "start" => Command::VideoStart,
                "stop" => Command::VideoStop,
                _ => return Err(ParseError(format!("video start|stop 중 하나: '{rest}'"))),
            },
            "play" if !rest.is_empty() => Command::Play(rest.to_string()),
            "play" => return Err(ParseError("play에는 사운드 ID가 필요합니다".to_string())),
            // 빈 텍스트 거부는 세션 정책에 맡긴다
            "speak" => Command::Speak(rest.to_string()),
            "mic" => match rest {
                "start" => Command::MicStart,
                "stop" => Command::MicStop,
                _ => return Err(ParseError(format!("mic start|stop 중 하나: '{rest}'"))),
            },
            "stop" => Command::Stop,
            "status" => Command::Status,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => return Err(ParseError(format!("알 수 없는 명령: '{other}'"))),
        };
        Ok(Some(command))
    }
}

/// 명령 실행 결과
#[derive(Debug)]
pub enum Outcome {
    Continue,
    Quit,
}

/// 세션에 명령 전달. 실패는 호출자가 표시한다
pub async fn execute(session: &Arc<TeleopSession>, command: Command) -> Result<Outcome, CoreError> {
    debug!("조작 명령: {:?}", command);
    match command {
        Command::Move { lx, ly } => session.throttle().update(ControlVector::new(lx, ly)),
        Command::Release => session.throttle().release(),
        Command::VideoStart => session.media().start().await?,
        Command::VideoStop => session.media().stop().await,
        Command::Play(id) => session.audio().play(&id).await?,
        Command::Speak(text) => session.audio().speak(&text).await?,
        Command::MicStart => session.audio().start_mic().await?,
        Command::MicStop => session.audio().stop_mic().await?,
        Command::Stop => session.audio().stop_all().await?,
        Command::Status => println!("{}", status_report(session).await),
        Command::Help => println!("{HELP}"),
        Command::Quit => return Ok(Outcome::Quit),
    }
    Ok(Outcome::Continue)
}

/// 상태 요약 (차량 오디오 상태 조회 포함)
async fn status_report(session: &Arc<TeleopSession>) -> String {
    let control = if session.is_control_connected() {
        "연결됨"
    } else {
        "끊김"
    };
    let last = session
        .throttle()
        .last_sent()
        .map(|v| format!("({:.2}, {:.2})", v.lx, v.ly))
        .unwrap_or_else(|| "-".to_string());
    let mut lines = vec![
        format!("제어 채널: {control} | 마지막 명령: {last}"),
        format!("영상: {}", session.media().state()),
        format!("오디오: {}", session.audio().status()),
    ];
    match session.telemetry().latest() {
        Some(sample) => lines.push(format!("시스템: {}", sample.summary())),
        None => lines.push("시스템: -".to_string()),
    }
    match session.audio().server_status().await {
        Ok(status) => {
            let playing = status.pygame.map(|p| p.is_playing).unwrap_or(false);
            lines.push(format!(
                "차량 오디오: 재생 중={} | 사운드 {:?}",
                playing, status.available_sounds
            ));
        }
        Err(e) => lines.push(format!("차량 오디오: 조회 실패 ({e})")),
    }
    if let Some(error) = session.indicator().current() {
        lines.push(format!("에러: {error}"));
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_motion() {
        assert_eq!(
            Command::parse("move 0.5 -1").unwrap(),
            Some(Command::Move { lx: 0.5, ly: -1.0 })
        );
        assert_eq!(
            Command::parse("  m 0 0  ").unwrap(),
            Some(Command::Move { lx: 0.0, ly: 0.0 })
        );
        assert!(Command::parse("move 0.5").is_err());
        assert!(Command::parse("move a b").is_err());
        assert!(Command::parse("move 1 2 3").is_err());
    }

    #[test]
    fn parses_audio_and_video() {
        assert_eq!(
            Command::parse("play sound1").unwrap(),
            Some(Command::Play("sound1".into()))
        );
        assert_eq!(
            Command::parse("speak hello rover").unwrap(),
            Some(Command::Speak("hello rover".into()))
        );
        assert_eq!(Command::parse("speak").unwrap(), Some(Command::Speak(String::new())));
        assert_eq!(Command::parse("MIC start").unwrap(), Some(Command::MicStart));
        assert_eq!(Command::parse("video stop").unwrap(), Some(Command::VideoStop));
        assert!(Command::parse("video pause").is_err());
        assert!(Command::parse("play").is_err());
    }

    #[test]
    fn blank_and_unknown() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        let err = Command::parse("jump").unwrap_err();
        assert!(err.to_string().contains("jump"));
        assert_eq!(Command::parse("q").unwrap(), Some(Command::Quit));
    }
}
