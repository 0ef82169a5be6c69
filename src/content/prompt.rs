//! Prompt Builder
//!
//! 各ステージでプロバイダーに送るプロンプトを組み立てます。

use crate::config::StyleConfig;
use crate::keywords::Outline;
use serde::{Deserialize, Serialize};

/// コンテンツのトーン
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tone {
    /// フォーマル
    Formal,
    /// カジュアル
    Casual,
    /// 技術的
    Technical,
    /// 親しみやすい
    Friendly,
    /// 専門的
    #[default]
    Professional,
}

impl Tone {
    /// プロンプト用の説明
    pub fn describe(&self) -> &'static str {
        match self {
            Tone::Formal => "formal and precise",
            Tone::Casual => "casual and conversational",
            Tone::Technical => "technical and detailed",
            Tone::Friendly => "warm and approachable",
            Tone::Professional => "professional and confident",
        }
    }
}

/// コンテンツ種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    /// ブログ記事
    #[default]
    BlogPost,
    /// レビュー
    Review,
    /// ソーシャル投稿
    SocialPost,
}

impl ContentType {
    fn describe(&self) -> &'static str {
        match self {
            ContentType::BlogPost => "blog post",
            ContentType::Review => "product review",
            ContentType::SocialPost => "long-form social media post",
        }
    }
}

/// ドラフト生成プロンプト
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContentPrompt {
    /// トピック
    pub topic: String,
    /// トーン
    pub tone: Tone,
    /// 種別
    pub content_type: ContentType,
    /// 目標語数
    pub word_count: usize,
    /// キーワード
    pub keywords: Vec<String>,
    /// ターゲットオーディエンス
    pub audience: Option<String>,
    /// アウトライン
    pub outline: Option<Outline>,
    /// 網羅すべき関連エンティティ
    pub entities: Vec<String>,
    /// 追加要件
    pub requirements: Vec<String>,
}

impl ContentPrompt {
    /// 新規プロンプトを作成
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            tone: Tone::default(),
            content_type: ContentType::default(),
            word_count: 1500,
            keywords: vec![],
            audience: None,
            outline: None,
            entities: vec![],
            requirements: vec![],
        }
    }

    /// トーンを設定
    pub fn with_tone(mut self, tone: Tone) -> Self {
        self.tone = tone;
        self
    }

    /// 種別を設定
    pub fn with_content_type(mut self, content_type: ContentType) -> Self {
        self.content_type = content_type;
        self
    }

    /// 目標語数を設定
    pub fn with_word_count(mut self, words: usize) -> Self {
        self.word_count = words;
        self
    }

    /// キーワードを設定
    pub fn with_keywords(mut self, keywords: Vec<String>) -> Self {
        self.keywords = keywords;
        self
    }

    /// オーディエンスを設定
    pub fn with_audience(mut self, audience: impl Into<String>) -> Self {
        self.audience = Some(audience.into());
        self
    }

    /// アウトラインを設定
    pub fn with_outline(mut self, outline: Outline) -> Self {
        self.outline = Some(outline);
        self
    }

    /// 関連エンティティを設定
    pub fn with_entities(mut self, entities: Vec<String>) -> Self {
        self.entities = entities;
        self
    }

    /// スタイル設定を反映
    pub fn with_style(mut self, style: &StyleConfig) -> Self {
        if let Some(tone) = style.tone {
            self.tone = tone;
        }
        if self.audience.is_none() {
            self.audience = style.target_audience.clone();
        }
        if let Some(voice) = &style.voice {
            self.requirements.push(format!("Write in the {} voice.", voice));
        }
        if let Some(cta) = &style.call_to_action {
            self.requirements
                .push(format!("Close with this call to action: \"{}\".", cta));
        }
        if let Some(banned) = style.banned_phrases.as_ref().filter(|b| !b.is_empty()) {
            self.requirements
                .push(format!("Never use these phrases: {}.", banned.join(", ")));
        }
        self
    }

    /// LLMプロンプトに変換
    pub fn to_llm_prompt(&self) -> String {
        let mut prompt = format!(
            "Write a {} about \"{}\" in Markdown.\n\n",
            self.content_type.describe(),
            self.topic
        );
        prompt.push_str(&format!("Tone: {}\n", self.tone.describe()));
        prompt.push_str(&format!("Length: about {} words\n", self.word_count));

        if !self.keywords.is_empty() {
            prompt.push_str(&format!(
                "Target keywords: {} (use each naturally, 0.5-2.5% density)\n",
                self.keywords.join(", ")
            ));
        }
        if let Some(audience) = &self.audience {
            prompt.push_str(&format!("Audience: {}\n", audience));
        }

        if let Some(outline) = &self.outline {
            prompt.push_str(&format!("\nOutline for \"{}\":\n", outline.title));
            for section in &outline.sections {
                prompt.push_str(&format!(
                    "- {} (~{} words)",
                    section.heading, section.target_words
                ));
                if !section.keywords.is_empty() {
                    prompt.push_str(&format!(" covering: {}", section.keywords.join(", ")));
                }
                prompt.push('\n');
            }
        }

        if !self.entities.is_empty() {
            prompt.push_str(&format!(
                "\nRelated topics and entities to cover: {}\n",
                self.entities.join(", ")
            ));
        }

        prompt.push_str("\nStructure requirements:\n");
        prompt.push_str("- Exactly one H1 title (# Title) on the first line\n");
        prompt.push_str("- At least three H2 sections (## Heading), the last one a conclusion\n");
        prompt.push_str("- Two to five paragraphs under every H2 section\n");
        prompt.push_str("- Use questions, concrete examples and a call to action\n");
        for requirement in &self.requirements {
            prompt.push_str(&format!("- {}\n", requirement));
        }
        prompt.push_str("\nReturn only the article in Markdown.");

        prompt
    }
}

/// 構造修正プロンプト
pub fn repair_prompt(text: &str, violations: &[String]) -> String {
    let mut prompt = "Revise the following Markdown article so it satisfies every structural rule. \
Keep the content, facts and links intact.\n\nProblems found:\n"
        .to_string();
    for violation in violations {
        prompt.push_str(&format!("- {}\n", violation));
    }
    prompt.push_str(
        "\nRules: exactly one H1 title, at least three H2 sections, two to five paragraphs per H2 section.\n\n",
    );
    prompt.push_str(&format!("Article:\n\n{}\n\nReturn only the revised article.", text));
    prompt
}

/// 読みやすさ改善プロンプト
pub fn simplify_prompt(text: &str, target_min: f64, target_max: f64) -> String {
    format!(
        "Rewrite the following Markdown article so its Flesch Reading Ease score is between {:.0} and {:.0}. \
Use shorter sentences and simpler words. Keep every heading, every link, every number and every fact \
exactly as written.\n\nArticle:\n\n{}\n\nReturn only the rewritten article.",
        target_min, target_max, text
    )
}

/// キーワード密度の調整方向
#[derive(Debug, Clone, PartialEq)]
pub struct DensityAdjustment {
    pub keyword: String,
    /// 現在の密度（%）
    pub current_percent: f64,
    /// 増やすべきか
    pub increase: bool,
}

/// キーワード密度修正プロンプト
pub fn density_rewrite_prompt(text: &str, adjustments: &[DensityAdjustment]) -> String {
    let mut prompt =
        "Lightly edit the following Markdown article to adjust keyword usage.\n\n".to_string();
    for adjustment in adjustments {
        prompt.push_str(&format!(
            "- \"{}\" appears at {:.2}% density; {} it to land between 0.5% and 2.5%\n",
            adjustment.keyword,
            adjustment.current_percent,
            if adjustment.increase {
                "increase"
            } else {
                "reduce"
            }
        ));
    }
    prompt.push_str(
        "\nDo not change any heading, number, statistic, date or link.\n\n",
    );
    prompt.push_str(&format!("Article:\n\n{}\n\nReturn only the edited article.", text));
    prompt
}

/// メタタイトル生成プロンプト
pub fn meta_title_prompt(text: &str, keywords: &[String], max_chars: usize) -> String {
    format!(
        "Write an SEO title of at most {} characters for the article below. \
Include the keyword \"{}\".\n\nArticle:\n\n{}\n\nReturn only the title.",
        max_chars,
        keywords.first().map(String::as_str).unwrap_or_default(),
        excerpt(text, 600)
    )
}

/// メタディスクリプション生成プロンプト
pub fn meta_description_prompt(text: &str, keywords: &[String], max_chars: usize) -> String {
    format!(
        "Write a meta description of at most {} characters for the article below. \
Mention: {}.\n\nArticle:\n\n{}\n\nReturn only the description.",
        max_chars,
        keywords.join(", "),
        excerpt(text, 1200)
    )
}

fn excerpt(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    text.chars().take(max_chars).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keywords::OutlineSection;

    #[test]
    fn test_content_prompt_builder() {
        let prompt = ContentPrompt::new("Dog Grooming")
            .with_tone(Tone::Friendly)
            .with_word_count(100)
            .with_keywords(vec!["dog grooming".to_string(), "pet care".to_string()])
            .with_audience("new dog owners");

        assert_eq!(prompt.topic, "Dog Grooming");
        assert_eq!(prompt.tone, Tone::Friendly);
        assert_eq!(prompt.keywords.len(), 2);

        let text = prompt.to_llm_prompt();
        assert!(text.contains("about 100 words"));
        assert!(text.contains("dog grooming, pet care"));
        assert!(text.contains("new dog owners"));
        assert!(text.contains("Exactly one H1"));
    }

    #[test]
    fn test_outline_and_style_in_prompt() {
        let outline = Outline {
            title: "Dog Grooming".to_string(),
            sections: vec![OutlineSection {
                heading: "Brushing Basics".to_string(),
                target_words: 300,
                keywords: vec!["brushing".to_string()],
            }],
        };
        let style = StyleConfig {
            tone: Some(Tone::Casual),
            call_to_action: Some("Book a grooming session".to_string()),
            ..Default::default()
        };
        let text = ContentPrompt::new("Dog Grooming")
            .with_outline(outline)
            .with_style(&style)
            .to_llm_prompt();

        assert!(text.contains("- Brushing Basics (~300 words) covering: brushing"));
        assert!(text.contains("casual and conversational"));
        assert!(text.contains("Book a grooming session"));
    }

    #[test]
    fn test_tone_serde_lowercase() {
        let tone: Tone = serde_json::from_str("\"technical\"").unwrap();
        assert_eq!(tone, Tone::Technical);
        let kind: ContentType = serde_json::from_str("\"social_post\"").unwrap();
        assert_eq!(kind, ContentType::SocialPost);
    }

    #[test]
    fn test_density_prompt_direction() {
        let prompt = density_rewrite_prompt(
            "# T",
            &[DensityAdjustment {
                keyword: "pet care".to_string(),
                current_percent: 0.1,
                increase: true,
            }],
        );
        assert!(prompt.contains("increase it"));
    }
}
