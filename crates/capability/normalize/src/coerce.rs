//! 字段值 -> 浮点样本。

use domain::FieldValue;

/// 耗材名称编码表（封闭集合，新增耗材需改代码）。
const MATERIALS: [(&str, f64); 11] = [
    ("PLA", 1.0),
    ("PETG", 2.0),
    ("ASA", 3.0),
    ("PC", 4.0),
    ("PVB", 5.0),
    ("ABS", 6.0),
    ("HIPS", 7.0),
    ("PP", 8.0),
    ("FLEX", 9.0),
    ("PA", 10.0),
    // 未装载耗材
    ("---", -1.0),
];

/// 将字段值转换为 gauge 样本。
///
/// 未识别的字符串返回 0，不视为错误。
pub fn coerce(value: &FieldValue) -> f64 {
    match value {
        FieldValue::I64(v) => *v as f64,
        FieldValue::F64(v) => *v,
        FieldValue::Bool(v) => {
            if *v {
                1.0
            } else {
                0.0
            }
        }
        FieldValue::String(v) => material_code(v).unwrap_or(0.0),
    }
}

/// 查询耗材编码。
pub fn material_code(name: &str) -> Option<f64> {
    MATERIALS
        .iter()
        .find(|(material, _)| *material == name)
        .map(|(_, code)| *code)
}
