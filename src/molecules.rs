// L1 分子层：在原子能力之上组合出表单、偏好设置与延迟测试

pub mod delay_testing;
pub mod form_view;
pub mod preferences;
pub mod settings_form;

pub use delay_testing::{DelayResult, DelayTester, ProgressCallback};
pub use form_view::{Control, FieldView, FormView, Section, SectionKind, SelectOption};
pub use preferences::{
    CHART_STYLE_COUNT, DEFAULT_LATENCY_TEST_URL, Language, PreferenceStore, Preferences,
};
pub use settings_form::{Commit, FieldChange, SettingsForm, TextField};
