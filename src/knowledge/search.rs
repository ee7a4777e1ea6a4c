//! 키워드 관련도 검색
//!
//! 질의어를 소문자 단어 집합으로 나누고, 각 문서에 부분 문자열로 등장하는
//! 단어 수를 점수로 사용합니다. 인덱스 없이 매 호출마다 전체를 훑습니다.

use indexmap::IndexSet;

use super::store::{DocumentRecord, KnowledgeStore};

/// 컨텍스트에 포함할 최대 문서 수
pub const TOP_K: usize = 3;

/// 검색 결과 항목
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit<'a> {
    pub identifier: &'a str,
    pub record: &'a DocumentRecord,
    /// 문서에 등장한 서로 다른 질의어 수
    pub score: usize,
}

/// 질의어 분리 (소문자, 공백 기준, 중복 제거)
pub fn query_terms(query: &str) -> IndexSet<String> {
    query
        .to_lowercase()
        .split_whitespace()
        .map(str::to_string)
        .collect()
}

/// 문서 점수 계산
///
/// 단어 경계를 보지 않으므로 "phone"은 "telephone"에도 일치합니다.
pub fn score_content(terms: &IndexSet<String>, content: &str) -> usize {
    let content = content.to_lowercase();
    terms.iter().filter(|term| content.contains(term.as_str())).count()
}

impl KnowledgeStore {
    /// 점수가 0보다 큰 문서를 점수 내림차순으로 반환
    ///
    /// 동점이면 저장소 삽입 순서를 유지합니다 (안정 정렬).
    pub fn rank(&self, query: &str) -> Vec<SearchHit<'_>> {
        let terms = query_terms(query);
        if terms.is_empty() {
            return vec![];
        }

        let mut hits: Vec<SearchHit<'_>> = self
            .iter()
            .filter_map(|(identifier, record)| {
                let score = score_content(&terms, &record.content);
                (score > 0).then_some(SearchHit {
                    identifier,
                    record,
                    score,
                })
            })
            .collect();

        hits.sort_by(|a, b| b.score.cmp(&a.score));
        hits
    }

    /// 상위 문서를 컨텍스트 블롭으로 결합
    ///
    /// 일치하는 문서가 없으면 `None`을 반환합니다.
    pub fn search(&self, query: &str) -> Option<String> {
        let hits = self.rank(query);
        if hits.is_empty() {
            return None;
        }

        let context = hits
            .iter()
            .take(TOP_K)
            .map(|hit| format!("--- 출처: {} ---\n{}\n", hit.identifier, hit.record.content))
            .collect::<Vec<_>>()
            .join("\n");

        Some(context)
    }
}

// ============================================================================
// Tests
// ============================================================================
