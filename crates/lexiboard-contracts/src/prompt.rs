use crate::vocabulary::{Category, VocabularyList};

/// Assembles the natural-language poster prompt sent to the image provider.
pub struct PosterPrompt;

impl PosterPrompt {
    /// All three inputs must be present and every category non-empty before
    /// a prompt is worth submitting.
    pub fn validate(scene: &str, title: &str, vocabulary: &VocabularyList) -> bool {
        !scene.trim().is_empty() && !title.trim().is_empty() && vocabulary.is_complete()
    }

    pub fn build(scene: &str, title: &str, vocabulary: &VocabularyList) -> String {
        let core = vocabulary.category(Category::Core).join(", ");
        let items = vocabulary.category(Category::Items).join(", ");
        let environment = vocabulary.category(Category::Environment).join(", ");

        format!(
            r#"请生成一张儿童识字小报《{scene}》，竖版 A4，学习小报版式，适合 5–9 岁孩子认字与看图识物。

# 一、小报标题区（顶部）

**顶部居中大标题**：《{title}》

-   **风格**：儿童学习报感
-   **文本要求**：大字、醒目、卡通手写体、彩色描边
-   **装饰**：周围添加与 {scene} 相关的贴纸风装饰，颜色鲜艳

# 二、小报主体（中间主画面）

画面中心是一幅 **卡通插画风的「{scene}」场景**：

-   **整体气氛**：明亮、温暖、积极
-   **构图**：物体边界清晰，方便对应文字，不要过于拥挤。

**场景分区与核心内容**

1.  **核心区域 A（主要对象）**：表现 {scene} 的核心活动。
2.  **核心区域 B（配套设施）**：展示相关的工具或物品。
3.  **核心区域 C（环境背景）**：体现环境特征（如墙面、指示牌等）。

**主题人物**

-   **角色**：1 位可爱卡通人物（职业/身份：与 {scene} 匹配）。
-   **动作**：正在进行与场景相关的自然互动。

# 三、必画物体与识字清单（Generated Content）

**请务必在画面中清晰绘制以下物体，并为其预留贴标签的位置：**

**1. 核心角色与设施：**
{core}

**2. 常见物品/工具：**
{items}

**3. 环境与装饰：**
{environment}

_(注意：画面中的物体数量不限于此，但以上列表必须作为重点描绘对象)_

# 四、识字标注规则

每个物体旁边需要添加"识字贴纸"：

-   **格式**：双行文字
    -   第一行：英文（小字）
    -   第二行：汉字（稍大）
-   **样式**：
    -   底色：白色或淡色带圆角矩形背景
    -   描边：彩色边框
    -   整体感觉像"贴纸"效果

**示例标注格式：**
```
┌──────────┐
│  apple   │  ← 英文
│  苹果     │  ← 汉字
└──────────┘
```

# 五、排版与美观要求

-   物体摆放合理，不过度重叠
-   标签不遮挡主体
-   色彩鲜艳但不刺眼
-   整体风格统一（卡通、儿童向）
-   保持识字小报的教育性和趣味性

# 六、技术要求

-   图片比例：9:16（竖版 A4）
-   分辨率：4K
-   风格：卡通插画风格，适合儿童
-   色彩：明亮温暖，不刺眼"#
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vocabulary() -> VocabularyList {
        VocabularyList {
            core: vec!["cashier 收银员".to_string(), "shelf 货架".to_string()],
            items: vec!["apple 苹果".to_string()],
            environment: vec!["exit 出口".to_string()],
        }
    }

    #[test]
    fn build_inlines_scene_title_and_word_lists() {
        let prompt = PosterPrompt::build("超市", "逛超市啦", &vocabulary());
        assert!(prompt.contains("《超市》"));
        assert!(prompt.contains("《逛超市啦》"));
        assert!(prompt.contains("cashier 收银员, shelf 货架"));
        assert!(prompt.contains("apple 苹果"));
        assert!(prompt.contains("exit 出口"));
    }

    #[test]
    fn validate_rejects_missing_pieces() {
        let full = vocabulary();
        assert!(PosterPrompt::validate("超市", "标题", &full));
        assert!(!PosterPrompt::validate("", "标题", &full));
        assert!(!PosterPrompt::validate("超市", "  ", &full));

        let mut gappy = vocabulary();
        gappy.environment.clear();
        assert!(!PosterPrompt::validate("超市", "标题", &gappy));
    }
}
