use crate::summary::model::Configuration;
use async_trait::async_trait;
use serde_json::Value;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

#[derive(thiserror::Error, Debug)]
pub enum RunnerError {
    #[error("runner not configured: {0}")]
    NotConfigured(String),
    #[error("failed to launch runner {program}: {reason}")]
    Launch { program: String, reason: String },
    #[error("runner exited with {code:?}: {stderr}")]
    Exit { code: Option<i32>, stderr: String },
    #[error("http error: {0}")]
    Http(String),
    #[error("invalid runner output: {0}")]
    InvalidOutput(String),
}

/// 外部汇总程序的调用边界：提交配置，拿回不透明的结果
#[async_trait]
pub trait SummaryRunner: Send + Sync {
    async fn run(&self, config: &Configuration) -> Result<Value, RunnerError>;
}

/// 以子进程方式运行外部脚本：配置 JSON 写入 stdin，结果 JSON 从 stdout 读取
#[derive(Clone, Debug)]
pub struct ScriptRunner {
    program: PathBuf,
    args: Vec<String>,
}

impl ScriptRunner {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// "python summary_script.py" 形式的命令行
    pub fn from_command_line(line: &str) -> Result<Self, RunnerError> {
        let mut parts = line.split_whitespace().map(|s| s.to_string());
        let program = parts
            .next()
            .ok_or_else(|| RunnerError::NotConfigured("RUNNER_COMMAND is empty".to_string()))?;
        Ok(Self::new(program, parts.collect()))
    }
}

#[async_trait]
impl SummaryRunner for ScriptRunner {
    async fn run(&self, config: &Configuration) -> Result<Value, RunnerError> {
        let program = self.program.display().to_string();
        let payload = serde_json::to_vec(config)
            .map_err(|e| RunnerError::InvalidOutput(format!("encode config: {}", e)))?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| RunnerError::Launch {
                program: program.clone(),
                reason: e.to_string(),
            })?;

        if let Some(mut stdin) = child.stdin.take() {
            // 子进程可能不读 stdin 就退出，写失败不算错误
            let _ = stdin.write_all(&payload).await;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| RunnerError::Launch {
                program,
                reason: e.to_string(),
            })?;

        if !output.status.success() {
            return Err(RunnerError::Exit {
                code: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        if stdout.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(stdout.trim()).map_err(|e| {
            RunnerError::InvalidOutput(format!("{}, 原始输出: {}", e, stdout.trim()))
        })
    }
}

/// 以 HTTP 服务方式运行：POST 配置 JSON，响应体即结果
#[derive(Clone)]
pub struct HttpRunner {
    client: reqwest::Client,
    url: String,
}

impl HttpRunner {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            url: url.into(),
        }
    }
}

#[async_trait]
impl SummaryRunner for HttpRunner {
    async fn run(&self, config: &Configuration) -> Result<Value, RunnerError> {
        let resp = self
            .client
            .post(&self.url)
            .json(config)
            .send()
            .await
            .map_err(|e| RunnerError::Http(e.to_string()))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| RunnerError::Http(e.to_string()))?;
        if !status.is_success() {
            return Err(RunnerError::Http(format!("{}: {}", status, body)));
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| RunnerError::InvalidOutput(e.to_string()))
    }
}

#[derive(Clone)]
pub enum InnerRunner {
    Script(ScriptRunner),
    Http(HttpRunner),
}

#[derive(Clone)]
pub struct AnyRunner {
    inner: InnerRunner,
}

impl AnyRunner {
    /// kind: "script" 或 "http"，其它取值视为未配置
    pub fn from_parts(
        kind: &str,
        command: Option<&str>,
        url: Option<&str>,
    ) -> Result<Self, RunnerError> {
        match kind.to_lowercase().as_str() {
            "http" => {
                let url = url
                    .filter(|u| !u.trim().is_empty())
                    .ok_or_else(|| RunnerError::NotConfigured("RUNNER_URL".to_string()))?;
                Ok(Self {
                    inner: InnerRunner::Http(HttpRunner::new(url.trim())),
                })
            }
            "script" => {
                let command = command
                    .ok_or_else(|| RunnerError::NotConfigured("RUNNER_COMMAND".to_string()))?;
                Ok(Self {
                    inner: InnerRunner::Script(ScriptRunner::from_command_line(command)?),
                })
            }
            other => Err(RunnerError::NotConfigured(format!("RUNNER_KIND={}", other))),
        }
    }
}

#[async_trait]
impl SummaryRunner for AnyRunner {
    async fn run(&self, config: &Configuration) -> Result<Value, RunnerError> {
        match &self.inner {
            InnerRunner::Script(r) => r.run(config).await,
            InnerRunner::Http(r) => r.run(config).await,
        }
    }
}
