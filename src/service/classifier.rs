use crate::config::MatchingConfig;
use crate::models::PassType;
use crate::service::candidates::Candidate;
use serde::Serialize;

/// 分类结果: 首选候选及其类别
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Classified {
    pub candidate: Candidate,
    pub pass_type: PassType,
}

/// 匹配分类器: 按阈值划档，并在前两名分差过小时标记 Ambiguous
pub struct MatchClassifier<'a> {
    config: &'a MatchingConfig,
}

impl<'a> MatchClassifier<'a> {
    pub fn new(config: &'a MatchingConfig) -> Self {
        Self { config }
    }

    /// 名义档位；低于 weak 阈值返回 None (不生成提案)
    pub fn band(&self, score: f64) -> Option<PassType> {
        if score >= self.config.exact_threshold {
            Some(PassType::Exact)
        } else if score >= self.config.strong_threshold {
            Some(PassType::Strong)
        } else if score >= self.config.weak_threshold {
            Some(PassType::Weak)
        } else {
            None
        }
    }

    /// 对已排序的候选列表分类
    ///
    /// `ranked` 须为分数降序。第二名同样达到 weak 阈值且与第一名分差
    /// 小于 epsilon 时，第一名标记为 Ambiguous，无论其名义档位。
    pub fn classify(&self, ranked: &[Candidate]) -> Option<Classified> {
        let top = ranked.first()?;
        let nominal = self.band(top.score)?;

        let ambiguous = ranked.get(1).is_some_and(|runner_up| {
            runner_up.score >= self.config.weak_threshold
                && top.score - runner_up.score < self.config.ambiguity_epsilon
        });

        Some(Classified {
            candidate: top.clone(),
            pass_type: if ambiguous { PassType::Ambiguous } else { nominal },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DocumentId;
    use crate::service::candidates::ScoreBreakdown;

    fn candidate(id: &str, score: f64) -> Candidate {
        Candidate {
            document_id: DocumentId::new(id),
            score,
            breakdown: ScoreBreakdown::default(),
        }
    }

    #[test]
    fn bands_follow_thresholds() {
        let config = MatchingConfig::default();
        let classifier = MatchClassifier::new(&config);
        assert_eq!(classifier.band(1.0), Some(PassType::Exact));
        assert_eq!(classifier.band(0.95), Some(PassType::Exact));
        assert_eq!(classifier.band(0.9), Some(PassType::Strong));
        assert_eq!(classifier.band(0.75), Some(PassType::Strong));
        assert_eq!(classifier.band(0.6), Some(PassType::Weak));
        assert_eq!(classifier.band(0.49), None);
    }

    #[test]
    fn close_runner_up_marks_top_ambiguous() {
        let config = MatchingConfig::default();
        let classifier = MatchClassifier::new(&config);
        let ranked = vec![candidate("D1", 0.81), candidate("D2", 0.80)];
        let classified = classifier.classify(&ranked).expect("classified");
        assert_eq!(classified.pass_type, PassType::Ambiguous);
        assert_eq!(classified.candidate.document_id, DocumentId::new("D1"));
    }

    #[test]
    fn ambiguity_overrides_exact_band() {
        let config = MatchingConfig::default();
        let classifier = MatchClassifier::new(&config);
        let ranked = vec![candidate("D1", 0.99), candidate("D2", 0.97)];
        let classified = classifier.classify(&ranked).expect("classified");
        assert_eq!(classified.pass_type, PassType::Ambiguous);
    }

    #[test]
    fn distant_runner_up_keeps_nominal_band() {
        let config = MatchingConfig::default();
        let classifier = MatchClassifier::new(&config);
        let ranked = vec![candidate("D1", 1.0), candidate("D2", 0.62)];
        let classified = classifier.classify(&ranked).expect("classified");
        assert_eq!(classified.pass_type, PassType::Exact);
    }

    #[test]
    fn runner_up_below_weak_does_not_cause_ambiguity() {
        let config = MatchingConfig::default();
        let classifier = MatchClassifier::new(&config);
        let ranked = vec![candidate("D1", 0.52), candidate("D2", 0.49)];
        let classified = classifier.classify(&ranked).expect("classified");
        assert_eq!(classified.pass_type, PassType::Weak);
    }

    #[test]
    fn below_weak_is_excluded() {
        let config = MatchingConfig::default();
        let classifier = MatchClassifier::new(&config);
        assert!(classifier.classify(&[candidate("D1", 0.3)]).is_none());
        assert!(classifier.classify(&[]).is_none());
    }
}
