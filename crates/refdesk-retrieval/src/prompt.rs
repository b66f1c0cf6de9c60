//! Prompt assembly for the two generation passes.
//!
//! Prompts are Japanese because the corpus and its users are. The
//! first pass steers the model into the labelled triple format that
//! `toc_reply` parses; the final pass grounds the answer in the
//! gathered evidence.

/// System prompt for the TOC-guided first pass: ask for the top two
/// document regions in a fixed, machine-parseable shape.
pub fn first_pass_system(toc_text: &str) -> String {
    format!(
        "以下の目次情報を参考に、ユーザーの質問に対して最も関連が高いと考えられる\"PDFファイル名\", \"PDF開始ページ\", \"PDF終了ページ\"を上位2件分を解答例の通りに適切に改行して回答して下さい。\n\
         ただし、上位2件の内容は必ず同じ内容を重複して解答しないようにして下さい。\n\
         \n\
         カテゴリに存在する全PDFファイルの目次情報:\n\
         {toc_text}\n\
         \n\
         解答例：\n\
         PDFファイル名: filename1.pdf\n\
         PDF開始ページ: 10\n\
         PDF終了ページ: 15\n\
         \n\
         PDFファイル名: filename2.pdf\n\
         PDF開始ページ: 5\n\
         PDF終了ページ: 7"
    )
}

/// System prompt for the final pass: answer from the first-pass page
/// context plus the ranked manual and FAQ evidence.
pub fn final_pass_system(
    range_texts: &[String],
    manual_texts: &[String],
    faq_texts: &[String],
) -> String {
    format!(
        "以下の情報を参考に、ユーザーの質問に答えてください。\n\
         \n\
         参考文書(目次情報)：\n\
         {}\n\
         \n\
         マニュアル情報:\n\
         {}\n\
         \n\
         FAQ情報:\n\
         {}",
        range_texts.join(" "),
        manual_texts.join(" "),
        faq_texts.join(" "),
    )
}
