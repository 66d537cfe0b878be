//! Baidu (百度股市通) adapter.
//!
//! Serves the news feed and the hot-search ranking. Both endpoints are
//! plain JSON behind the pae.baidu.com gateway.

use async_trait::async_trait;
use serde_json::Value;

use crate::codec::json_path;
use crate::error::{FetchError, FetchResult};
use crate::models::*;
use crate::net::Gateway;
use crate::sources::{SourceAdapter, SourceId};

const HOST: &str = "baidu.com";
const REFERER: &str = "https://gushitong.baidu.com/";

pub struct Baidu;

fn text(row: &Value, key: &str) -> String {
    row.get(key).and_then(Value::as_str).unwrap_or_default().to_string()
}

fn map_news(value: &Value) -> Vec<NewsItem> {
    let Some(rows) = json_path(value, "Result.content.list").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .enumerate()
        .filter_map(|(rank, row)| {
            let title = text(row, "title");
            if title.is_empty() {
                return None;
            }
            Some(NewsItem {
                id: text(row, "loc"),
                title,
                body: text(row, "content"),
                time: text(row, "publish_time"),
                source: "百度股市通".to_string(),
                importance: Importance::from_rank(rank),
            })
        })
        .collect()
}

fn map_hot(value: &Value) -> Vec<HotTopic> {
    let Some(rows) = json_path(value, "Result.list").and_then(Value::as_array) else {
        return Vec::new();
    };
    rows.iter()
        .enumerate()
        .filter_map(|(rank, row)| {
            let title = text(row, "name");
            if title.is_empty() {
                return None;
            }
            let heat = match row.get("heat") {
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(Value::String(s)) => s.parse().unwrap_or(0.0),
                _ => 0.0,
            };
            Some(HotTopic {
                rank: rank as u32 + 1,
                title,
                heat,
                source: "百度股市通".to_string(),
            })
        })
        .collect()
}

fn non_empty<T>(records: Vec<T>) -> FetchResult<Vec<T>> {
    if records.is_empty() {
        Err(FetchError::EmptyResult)
    } else {
        Ok(records)
    }
}

#[async_trait]
impl SourceAdapter for Baidu {
    fn id(&self) -> SourceId {
        SourceId::Baidu
    }

    async fn news(&self, gw: &Gateway, limit: usize) -> FetchResult<Vec<NewsItem>> {
        let url = format!(
            "https://finance.pae.baidu.com/selfselect/news?rn={limit}&pn=0&tag=A%E8%82%A1&finClientType=pc"
        );
        let body = gw.get_text(HOST, &url, Some(REFERER), None).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_news(&value))
    }

    async fn hot_topics(&self, gw: &Gateway, limit: usize) -> FetchResult<Vec<HotTopic>> {
        let url = format!(
            "https://finance.pae.baidu.com/vapi/v1/hotrank?product=stock&day=0&pn=0&rn={limit}&market=ab&type=hour&finClientType=pc"
        );
        let body = gw.get_text(HOST, &url, Some(REFERER), None).await?;
        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::Decode(e.to_string()))?;
        non_empty(map_hot(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn news_mapping_walks_nested_result() {
        let value = json!({"ResultCode": "0", "Result": {"content": {"list": [
            {"title": "央行宣布降准", "content": "……", "publish_time": "1705298400", "loc": "n1"},
            {"title": "", "content": "无标题被丢弃"}
        ]}}});
        let news = map_news(&value);
        assert_eq!(news.len(), 1);
        assert_eq!(news[0].title, "央行宣布降准");
        assert_eq!(news[0].importance, Importance::High);
    }

    #[test]
    fn hot_ranking_keeps_feed_order() {
        let value = json!({"Result": {"list": [
            {"name": "贵州茅台", "heat": "98765"},
            {"name": "宁德时代", "heat": 87654}
        ]}});
        let topics = map_hot(&value);
        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].rank, 1);
        assert_eq!(topics[0].heat, 98765.0);
        assert_eq!(topics[1].heat, 87654.0);
    }
}
