use domain::{Envelope, FieldValue, Point, metric_name};

#[test]
fn metric_name_uses_measurement_for_bare_keys() {
    assert_eq!(metric_name("temp_noz", "v"), "temp_noz");
    assert_eq!(metric_name("temp_noz", "value"), "temp_noz");
}

#[test]
fn metric_name_appends_other_keys() {
    assert_eq!(metric_name("fan", "rpm"), "fan_rpm");
    assert_eq!(metric_name("fan", "values"), "fan_values");
    assert_eq!(metric_name("fan", "V"), "fan_V");
}

#[test]
fn point_builder_collects_tags_and_fields() {
    let point = Point::new("fan")
        .with_tag("printer_mac", "ABC")
        .with_field("rpm", FieldValue::I64(1500))
        .with_field("pwm", FieldValue::F64(0.5));

    assert_eq!(point.measurement, "fan");
    assert_eq!(point.tags.get("printer_mac").map(String::as_str), Some("ABC"));
    assert_eq!(point.fields.len(), 2);
}

#[test]
fn envelope_new_sets_identity() {
    let envelope = Envelope::new("ABC", "10.0.0.5:4000", "body");
    assert_eq!(envelope.device_id.as_deref(), Some("ABC"));
    assert_eq!(envelope.source_address.as_deref(), Some("10.0.0.5:4000"));
}
