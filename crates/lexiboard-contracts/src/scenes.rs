use indexmap::IndexMap;

use crate::vocabulary::VocabularyList;

/// Built-in scene vocabularies, keyed by scene name in menu order.
///
/// A preset scene short-circuits the text API: its word list is served
/// directly from this table.
#[derive(Debug, Clone)]
pub struct SceneTable {
    scenes: IndexMap<String, VocabularyList>,
}

impl SceneTable {
    pub fn builtin() -> Self {
        Self {
            scenes: builtin_scenes(),
        }
    }

    pub fn get(&self, scene: &str) -> Option<&VocabularyList> {
        self.scenes.get(scene.trim())
    }

    pub fn contains(&self, scene: &str) -> bool {
        self.scenes.contains_key(scene.trim())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.scenes.keys().map(String::as_str)
    }
}

fn builtin_scenes() -> IndexMap<String, VocabularyList> {
    let mut map = IndexMap::new();

    let mut insert = |scene: &str, core: &[&str], items: &[&str], environment: &[&str]| {
        map.insert(
            scene.to_string(),
            VocabularyList {
                core: core.iter().map(|word| (*word).to_string()).collect(),
                items: items.iter().map(|word| (*word).to_string()).collect(),
                environment: environment.iter().map(|word| (*word).to_string()).collect(),
            },
        );
    };

    insert(
        "超市",
        &[
            "cashier 收银员",
            "shelf 货架",
            "shopping cart 购物车",
            "checkout counter 收银台",
        ],
        &[
            "apple 苹果",
            "milk 牛奶",
            "bread 面包",
            "egg 鸡蛋",
            "vegetable 蔬菜",
            "fruit 水果",
            "drink 饮料",
            "snack 零食",
        ],
        &[
            "exit 出口",
            "entrance 入口",
            "light 灯",
            "sign 指示牌",
            "price tag 价格标签",
        ],
    );
    insert(
        "医院",
        &[
            "doctor 医生",
            "nurse 护士",
            "patient 病人",
            "registration desk 挂号处",
        ],
        &[
            "stethoscope 听诊器",
            "thermometer 体温计",
            "syringe 针筒",
            "medicine 药",
            "bandage 绷带",
            "wheelchair 轮椅",
        ],
        &[
            "clinic room 诊室",
            "waiting area 等候区",
            "registration card 挂号牌",
            "emergency exit 紧急出口",
        ],
    );
    insert(
        "公园",
        &["swing 秋千", "slide 滑梯", "seesaw 跷跷板", "sandbox 沙坑"],
        &[
            "ball 球",
            "kite 风筝",
            "bicycle 自行车",
            "bench 长椅",
            "fountain 喷泉",
            "trash can 垃圾桶",
        ],
        &["tree 树", "grass 草地", "flower 花", "path 小路", "pond 池塘"],
    );
    insert(
        "动物园",
        &[
            "zookeeper 饲养员",
            "cage 笼子",
            "fence 围栏",
            "ticket booth 售票处",
        ],
        &[
            "lion 狮子",
            "elephant 大象",
            "monkey 猴子",
            "panda 熊猫",
            "giraffe 长颈鹿",
            "ticket 门票",
            "camera 相机",
        ],
        &[
            "signboard 指示牌",
            "visitor center 游客中心",
            "food stand 小卖部",
            "rest area 休息区",
        ],
    );
    insert(
        "学校",
        &[
            "teacher 老师",
            "student 学生",
            "classroom 教室",
            "blackboard 黑板",
        ],
        &[
            "desk 课桌",
            "chair 椅子",
            "book 书",
            "pencil 铅笔",
            "eraser 橡皮",
            "schoolbag 书包",
            "ruler 尺子",
        ],
        &[
            "playground 操场",
            "library 图书馆",
            "flag 国旗",
            "corridor 走廊",
        ],
    );

    map
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_table_lists_scenes_in_menu_order() {
        let table = SceneTable::builtin();
        let names: Vec<&str> = table.names().collect();
        assert_eq!(names, vec!["超市", "医院", "公园", "动物园", "学校"]);
    }

    #[test]
    fn preset_lookup_returns_complete_vocabulary() {
        let table = SceneTable::builtin();
        for scene in ["超市", "医院", "公园", "动物园", "学校"] {
            let vocabulary = table.get(scene).expect("preset scene present");
            assert!(vocabulary.is_complete(), "{scene} vocabulary incomplete");
        }
        assert!(table.get("太空站").is_none());
    }

    #[test]
    fn lookup_trims_surrounding_whitespace() {
        let table = SceneTable::builtin();
        assert!(table.contains(" 超市 "));
        let vocabulary = table.get(" 超市 ").expect("trimmed lookup");
        assert_eq!(vocabulary.core[0], "cashier 收银员");
    }
}
