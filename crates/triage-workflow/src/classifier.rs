//! 分诊结果分级
//!
//! 按关键字把服务返回的分类文本映射为严重程度等级，只用于展示，原文保持不变。

use serde::{Deserialize, Serialize};

/// 严重程度等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SeverityTier {
    Critical,
    High,
    Medium,
    Low,
    Unclassified,
}

/// 结果卡片的强调色
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Accent {
    Red,
    Orange,
    Yellow,
    Green,
    Blue,
}

/// 结果图标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TierIcon {
    Alert,
    Clock,
    Check,
}

// 按顺序匹配，先命中者为准
const KEYWORD_TIERS: &[(&[&str], SeverityTier)] = &[
    (&["very severe", "emergency"], SeverityTier::Critical),
    (&["severe", "urgent"], SeverityTier::High),
    (&["moderate"], SeverityTier::Medium),
    (&["mild", "not severe"], SeverityTier::Low),
];

/// 分类文本映射为等级，不区分大小写
pub fn classify(category: &str) -> SeverityTier {
    let category = category.to_lowercase();
    KEYWORD_TIERS
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| category.contains(k)))
        .map(|(_, tier)| *tier)
        .unwrap_or(SeverityTier::Unclassified)
}

impl SeverityTier {
    pub fn accent(self) -> Accent {
        match self {
            Self::Critical => Accent::Red,
            Self::High => Accent::Orange,
            Self::Medium => Accent::Yellow,
            Self::Low => Accent::Green,
            Self::Unclassified => Accent::Blue,
        }
    }

    /// 无法识别的分类按需要关注处理
    pub fn icon(self) -> TierIcon {
        match self {
            Self::Critical | Self::High | Self::Unclassified => TierIcon::Alert,
            Self::Medium => TierIcon::Clock,
            Self::Low => TierIcon::Check,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::Critical => "Critical",
            Self::High => "High",
            Self::Medium => "Medium",
            Self::Low => "Low",
            Self::Unclassified => "Unclassified",
        }
    }
}

impl Accent {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::Orange => "orange",
            Self::Yellow => "yellow",
            Self::Green => "green",
            Self::Blue => "blue",
        }
    }
}
