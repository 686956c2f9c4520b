//! Drives one run over the selected races and reports progress as events.

use anyhow::{bail, Context, Result};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::AppConfig;
use crate::dify::DifyClient;
use crate::matchup;
use crate::prompt::build_prompt;
use crate::resources::Resources;
use crate::scraper::{AuthorityClient, HttpFetcher, KeibabookClient, NankanClient};
use crate::types::{RaceKey, RunEvent, RunMode, RunRequest};

/// Sends events; `false` once the receiver is gone
struct Events {
    tx: mpsc::Sender<RunEvent>,
}

impl Events {
    async fn send(&self, event: RunEvent) -> bool {
        self.tx.send(event).await.is_ok()
    }

    async fn status(&self, message: impl Into<String>) -> bool {
        self.send(RunEvent::Status(message.into())).await
    }

    async fn error(&self, message: impl Into<String>) -> bool {
        let message = message.into();
        error!("{}", message);
        self.send(RunEvent::Error(message)).await
    }
}

/// Per-run clients
struct RaceRunner<'a> {
    nankan: NankanClient,
    authority: AuthorityClient,
    keibabook: Option<KeibabookClient>,
    dify: Option<DifyClient>,
    resources: &'a Resources,
}

impl RaceRunner<'_> {
    async fn process_race(&self, key: &RaceKey, events: &Events) -> Result<String> {
        let detail = self.nankan.fetch_detail(key, self.resources).await?;

        let card = match self.authority.fetch_race_card(&key.day, key.race).await {
            Ok(card) => Some(card),
            Err(e) => {
                warn!("{}R: race card unavailable: {:#}", key.race, e);
                None
            }
        };

        if detail.horses.is_empty() && card.as_ref().map_or(true, |c| c.entries.is_empty()) {
            bail!("出走馬データが見つかりません");
        }

        let training = match &self.keibabook {
            Some(keibabook) => keibabook.fetch_training(key).await.unwrap_or_else(|e| {
                warn!("{}R: training notes unavailable: {:#}", key.race, e);
                BTreeMap::new()
            }),
            None => BTreeMap::new(),
        };

        let prompt = build_prompt(
            &key.day,
            key.race,
            &detail,
            card.as_ref(),
            &training,
            self.resources,
        );

        let Some(dify) = &self.dify else {
            return Ok(prompt);
        };

        events.status(format!("{}R をAIで予想中...", key.race)).await;
        let reply = dify
            .run(&prompt)
            .await
            .with_context(|| format!("{}R のAI予想に失敗しました", key.race))?;

        let table = match self.nankan.fetch_matchup(key).await {
            Ok(table) => matchup::render(&table, &matchup::parse_grades(&reply)),
            Err(e) => {
                warn!("{}R: matchup table unavailable: {:#}", key.race, e);
                "対戦表を取得できませんでした".to_string()
            }
        };

        Ok(format!("{}\n\n{}", reply, table))
    }
}

/// Run every selected race of the request, streaming events into `tx`.
///
/// Per-race failures are reported and the run moves on to the next race.
/// The run stops early when the receiver is dropped.
pub async fn run_races(
    config: &AppConfig,
    resources: &Resources,
    request: &RunRequest,
    tx: mpsc::Sender<RunEvent>,
) {
    let events = Events { tx };

    let races = match request.race_numbers() {
        Ok(races) => races,
        Err(e) => {
            events.error(format!("レース指定が不正です: {}", e)).await;
            return;
        }
    };
    let day = request.day();

    if !events
        .status(format!(
            "🚀 {} {}競馬 ({}レース) の【{}】を開始します...",
            day.slash_date(),
            day.place,
            races.len(),
            request.mode.label()
        ))
        .await
    {
        return;
    }

    let fetcher = match HttpFetcher::new(&config.scraper) {
        Ok(fetcher) => fetcher,
        Err(e) => {
            events.error(format!("HTTPクライアントの初期化に失敗しました: {}", e)).await;
            return;
        }
    };
    let nankan = NankanClient::new(fetcher.clone(), &config.sites.nankan_url);
    let authority = AuthorityClient::new(fetcher, &config.sites.authority_url);

    let dify = match request.mode {
        RunMode::Raw => None,
        RunMode::Dify => match DifyClient::new(&config.dify) {
            Ok(client) => Some(client),
            Err(e) => {
                events.error(format!("Difyクライアントの初期化に失敗しました: {}", e)).await;
                return;
            }
        },
    };

    events.status("開催回・日次を取得中...").await;
    let meeting = match nankan.resolve_meeting(&day).await {
        Ok(meeting) => meeting,
        Err(e) => {
            events
                .error(format!("開催情報を取得できませんでした: {:#}", e))
                .await;
            return;
        }
    };
    if !events
        .status(format!("第{}回 {}日目", meeting.kai, meeting.nichi))
        .await
    {
        return;
    }

    let keibabook = match config.sites.keibabook_credentials() {
        Some((id, password)) => {
            events.status("競馬ブックにログイン中...").await;
            match KeibabookClient::login(
                &config.sites.keibabook_url,
                id,
                password,
                config.scraper.chrome_executable.as_deref(),
            )
            .await
            {
                Ok(client) => Some(client),
                Err(e) => {
                    events
                        .error(format!(
                            "競馬ブックへのログインに失敗しました（調教データなしで続行）: {:#}",
                            e
                        ))
                        .await;
                    None
                }
            }
        }
        None => {
            events
                .status("競馬ブックの認証情報が未設定のため調教データをスキップします")
                .await;
            None
        }
    };

    let runner = RaceRunner {
        nankan,
        authority,
        keibabook,
        dify,
        resources,
    };

    let mut connected = true;
    for race in races {
        let key = RaceKey { day, meeting, race };
        if !events.status(format!("{}R のデータを取得中...", race)).await {
            connected = false;
            break;
        }

        let delivered = match runner.process_race(&key, &events).await {
            Ok(text) => {
                info!("{} {}R done", day.place, race);
                events.send(RunEvent::Result { race, text }).await
            }
            Err(e) => events.error(format!("{}R: {:#}", race, e)).await,
        };
        if !delivered {
            connected = false;
            break;
        }
    }

    if let Some(keibabook) = runner.keibabook {
        if let Err(e) = keibabook.close().await {
            warn!("Failed to close browser: {}", e);
        }
    }

    if connected {
        events.status("✅ 全ての処理が完了しました").await;
    } else {
        info!("Event receiver dropped, run aborted");
    }
}
