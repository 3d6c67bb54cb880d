use crate::product::ProductRecord;

pub const WELCOME: &str = "👋 Привет! Я помогу сделать карточку товара.\n\nОпишите товар текстом или пришлите его фото, я распознаю название, цену и категорию и соберу готовую картинку 800×800.";
pub const CHOOSE_INPUT: &str = "Как будем создавать карточку?";
pub const TEXT_PROMPT: &str = "📝 Опишите товар одним сообщением: название, цену, категорию, размер.\n\nНапример: «Беспроводные наушники Sony, цена 15990, категория электроника»";
pub const PHOTO_PROMPT: &str = "📸 Пришлите фото товара. В подписи можно указать цену или название.";
pub const ANALYZING_TEXT: &str = "🔍 Анализирую описание...";
pub const ANALYZING_PHOTO: &str = "🔍 Анализирую фото...";
pub const CONFIRM_QUESTION: &str = "Всё верно?";
pub const CHOOSE_STYLE: &str = "🎨 Выберите стиль карточки:";
pub const GENERATING_IMAGE: &str = "🖼 Генерирую изображение товара...";
pub const BUILDING_CARD: &str = "⏳ Собираю карточку...";
pub const CARD_READY: &str = "✅ Карточка готова!";
pub const CANCELLED: &str = "❌ Отменено. Нажмите /start, чтобы начать заново.";
pub const EMPTY_TEXT: &str = "Сообщение пустое. Опишите товар текстом.";
pub const UNSUPPORTED_MEDIA: &str = "Этот формат не поддерживается. Пришлите фото в JPEG, PNG или WebP.";
pub const ANALYSIS_TIMEOUT: &str = "⌛ Сервис распознавания не ответил вовремя. Попробуйте ещё раз.";
pub const ANALYSIS_REMOTE: &str = "⚠️ Сервис распознавания временно недоступен. Попробуйте ещё раз чуть позже.";
pub const ANALYSIS_PARSE: &str = "🤔 Не удалось распознать товар. Попробуйте описать его подробнее.";
pub const PHOTO_PARSE: &str = "🤔 Не удалось распознать товар на фото. Пришлите другое фото или добавьте подпись с названием.";
pub const GENERATION_TIMEOUT: &str = "⌛ Генерация изображения заняла слишком много времени. Выберите стиль, чтобы попробовать ещё раз.";
pub const GENERATION_REMOTE: &str = "⚠️ Не удалось сгенерировать изображение товара. Выберите стиль, чтобы попробовать ещё раз.";
pub const BUILD_FAILED: &str = "⚠️ Не удалось собрать карточку. Выберите стиль ещё раз.";
pub const INTERNAL_FAILURE: &str = "⚠️ Что-то пошло не так. Выберите стиль ещё раз или начните заново через /start.";
pub const UNKNOWN_COMMAND: &str =
    "Такой команды нет. Доступны /start, /help и /cancel.";
pub const IDLE_HINT: &str = "Нажмите /start, чтобы создать карточку товара.";
pub const USE_BUTTONS: &str = "Пожалуйста, выберите вариант кнопкой ниже.";
pub const WAIT_FOR_CARD: &str = "⏳ Карточка ещё собирается, подождите немного.";
pub const DELIVERED_HINT: &str = "Хотите сделать ещё одну карточку?";
pub const REVISE_PHOTO: &str = "✏️ Пришлите новое фото или напишите уточнение к этому (например, цену или название).";
pub const PHOTO_DOWNLOAD_FAILED: &str = "⚠️ Не удалось загрузить фото из Telegram. Попробуйте отправить его ещё раз.";
pub const EXPECTING_PHOTO: &str = "Пришлите, пожалуйста, фото товара.";

pub const HELP: &str = "ℹ️ Как пользоваться ботом:\n\n1. /start и выберите способ: текст или фото.\n2. Опишите товар или пришлите фото (цену можно указать в подписи).\n3. Проверьте распознанные данные и подтвердите их или исправьте.\n4. Выберите стиль: Минимал, Тёмный или Маркетплейс.\n5. Получите готовую карточку 800×800.\n\n/cancel отменяет текущую карточку.";

pub const BUTTON_FROM_TEXT: &str = "📝 Из текста";
pub const BUTTON_FROM_PHOTO: &str = "📸 Из фото";
pub const BUTTON_CONFIRM: &str = "✅ Всё верно";
pub const BUTTON_REVISE: &str = "✏️ Исправить";
pub const BUTTON_NEW_CARD: &str = "➕ Новая карточка";

/// Human-readable summary of a draft for the confirmation prompt.
pub fn record_summary(record: &ProductRecord) -> String {
    let missing = "не указано";
    let mut lines = vec![
        "📦 Распознанные данные:".to_string(),
        String::new(),
        format!("Название: {}", record.name),
        format!(
            "Цена: {}",
            record
                .price_label()
                .unwrap_or_else(|| "не указана".to_string())
        ),
        format!(
            "Категория: {}",
            record.category.as_deref().unwrap_or(missing)
        ),
    ];
    if let Some(size) = &record.size {
        lines.push(format!("Размер: {size}"));
    }
    if let Some(color) = &record.color {
        lines.push(format!("Цвет: {color}"));
    }
    if let Some(description) = &record.description {
        lines.push(format!("Описание: {description}"));
    }
    lines.push(String::new());
    lines.push(CONFIRM_QUESTION.to_string());
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::product::Price;

    #[test]
    fn summary_lists_present_fields_only() {
        let record = ProductRecord {
            name: "Кружка".into(),
            price: Some(Price::rub(1200)),
            category: Some("посуда".into()),
            ..ProductRecord::default()
        };
        let summary = record_summary(&record);
        assert!(summary.contains("Название: Кружка"));
        assert!(summary.contains("Цена: 1 200 ₽"));
        assert!(summary.contains("Категория: посуда"));
        assert!(!summary.contains("Размер"));
        assert!(summary.ends_with(CONFIRM_QUESTION));
    }
}
